//! Per-service proof rules.
//!
//! Each [Service] knows what a proof url has to look like, where to actually
//! fetch it from, and how to dig the armored message out of whatever comes
//! back. Services never fetch anything themselves.

use crate::{
    crypto::{armor, base::KeyID},
    error::{Error, Result},
    user::UserClaim,
    util::Url,
};
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

/// A service a user can prove they have an account on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// `https://twitter.com/<name>/status/<id>`
    Twitter,
    /// `https://gist.github.com/<name>/<id>`
    Github,
    /// `https://reddit.com/r/<subreddit>/comments/<id>/<name>/`
    Reddit,
    /// `https://<name>/.well-known/sigchain.txt` where the name is a domain
    Https,
    /// `test://echo/<name>/<key_id>?m=<message>`, for testing. The proof
    /// travels inside the url.
    Echo,
}

/// Where a proof lives on a self-hosted domain.
pub const HTTPS_PROOF_PATH: &str = "/.well-known/sigchain.txt";

fn path_invalid(url: &Url) -> Error {
    Error::ProofPathInvalid(format!("path invalid for url {}", url))
}

fn name_mismatch(url: &Url) -> Error {
    Error::ProofPathInvalid(format!("path invalid (name mismatch) for url {}", url))
}

/// Grab the non-empty path segments of a url.
fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default()
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Github => "github",
            Self::Reddit => "reddit",
            Self::Https => "https",
            Self::Echo => "echo",
        }
    }

    fn max_name_len(&self) -> usize {
        match self {
            Self::Twitter => 15,
            Self::Github => 39,
            Self::Reddit => 20,
            Self::Https => 253,
            Self::Echo => 64,
        }
    }

    fn valid_name_char(&self, ch: char) -> bool {
        match self {
            Self::Twitter => ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_',
            Self::Github => ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-',
            Self::Reddit => ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-',
            Self::Https => ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '.',
            Self::Echo => ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-' || ch == '.',
        }
    }

    /// Clean up a name the way people tend to type it: trimmed, lowercased,
    /// and without the `@` twitter people put in front of everything.
    pub fn normalize_name(&self, name: &str) -> String {
        let name = name.trim();
        let name = match self {
            Self::Twitter => name.strip_prefix('@').unwrap_or(name),
            _ => name,
        };
        name.to_lowercase()
    }

    /// Check a (normalized) name against this service's rules.
    pub fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            Err(Error::ClaimNoID)?;
        }
        if name.starts_with('#') {
            Err(Error::ClaimReserved(name.to_string()))?;
        }
        if name.len() > self.max_name_len() {
            Err(Error::ClaimInvalidName(format!("{} name is too long, must be at most {}", self.as_str(), self.max_name_len())))?;
        }
        if let Some(ch) = name.chars().find(|ch| !self.valid_name_char(*ch)) {
            Err(Error::ClaimInvalidName(format!("{} name has an invalid character {:?}", self.as_str(), ch)))?;
        }
        if self == &Self::Https && (!name.contains('.') || name.starts_with('.') || name.ends_with('.')) {
            Err(Error::ClaimInvalidName(format!("invalid domain {}", name)))?;
        }
        Ok(())
    }

    /// Make sure the url uses a scheme this service allows.
    pub fn validate_url(&self, url: &Url) -> Result<()> {
        let scheme = match self {
            Self::Echo => "test",
            _ => "https",
        };
        if url.scheme() != scheme {
            Err(Error::ClaimInvalidUrl(format!("invalid scheme for url {}", url)))?;
        }
        Ok(())
    }

    /// Check that the claim's url looks like this service's proof urls, and
    /// that it points at the claimed account.
    pub fn validate_path(&self, url: &Url, claim: &UserClaim) -> Result<()> {
        let name = claim.name().as_str();
        let host = url.host_str().unwrap_or("");
        let segs = segments(url);
        match self {
            Self::Twitter => {
                if url.scheme() != "https" || !matches!(host, "twitter.com" | "mobile.twitter.com" | "www.twitter.com") {
                    Err(path_invalid(url))?;
                }
                match segs.as_slice() {
                    [account, "status", id] if id.chars().all(|c| c.is_ascii_digit()) => {
                        if !account.eq_ignore_ascii_case(name) {
                            Err(name_mismatch(url))?;
                        }
                    }
                    _ => Err(path_invalid(url))?,
                }
            }
            Self::Github => {
                if url.scheme() != "https" || host != "gist.github.com" {
                    Err(path_invalid(url))?;
                }
                match segs.as_slice() {
                    [account, id] if id.chars().all(|c| c.is_ascii_hexdigit()) => {
                        if !account.eq_ignore_ascii_case(name) {
                            Err(name_mismatch(url))?;
                        }
                    }
                    _ => Err(path_invalid(url))?,
                }
            }
            Self::Reddit => {
                if url.scheme() != "https" || !matches!(host, "reddit.com" | "www.reddit.com" | "old.reddit.com") {
                    Err(path_invalid(url))?;
                }
                match segs.as_slice() {
                    ["r", _subreddit, "comments", _id, account] => {
                        if !account.eq_ignore_ascii_case(name) {
                            Err(name_mismatch(url))?;
                        }
                    }
                    _ => Err(path_invalid(url))?,
                }
            }
            Self::Https => {
                if url.scheme() != "https" || url.path() != HTTPS_PROOF_PATH {
                    Err(path_invalid(url))?;
                }
                if !host.eq_ignore_ascii_case(name) {
                    Err(name_mismatch(url))?;
                }
            }
            Self::Echo => {
                if url.scheme() != "test" || host != "echo" {
                    Err(path_invalid(url))?;
                }
                match segs.as_slice() {
                    [account, key_id] => {
                        if !account.eq_ignore_ascii_case(name) {
                            Err(name_mismatch(url))?;
                        }
                        if *key_id != claim.key_id().as_string() {
                            Err(Error::ProofPathInvalid(format!("path invalid (key mismatch) for url {}", url)))?;
                        }
                    }
                    _ => Err(path_invalid(url))?,
                }
            }
        }
        Ok(())
    }

    /// The url we actually fetch to get at the proof. `None` means the proof
    /// is inline (see [inline_content][Service::inline_content]).
    pub fn request_url(&self, url: &Url) -> Result<Option<Url>> {
        let request_url = match self {
            Self::Twitter => {
                let mut req = url.clone();
                req.set_host(Some("mobile.twitter.com")).map_err(|_| path_invalid(url))?;
                Some(req)
            }
            Self::Reddit => {
                let mut req = url.clone();
                req.set_host(Some("www.reddit.com")).map_err(|_| path_invalid(url))?;
                let path = format!("{}.json", url.path().trim_end_matches('/'));
                req.set_path(&path);
                req.set_query(None);
                Some(req)
            }
            Self::Github | Self::Https => Some(url.clone()),
            Self::Echo => None,
        };
        Ok(request_url)
    }

    /// For services that carry their proof in the url itself, pull it out.
    pub fn inline_content(&self, url: &Url) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Echo => {
                let message = url
                    .query_pairs()
                    .find(|(key, _)| key == "m")
                    .map(|(_, val)| val.into_owned().into_bytes())
                    .ok_or_else(|| Error::ProofContentInvalid(format!("no message in url {}", url)))?;
                Ok(Some(message))
            }
            _ => Ok(None),
        }
    }

    /// Find the armored proof message in some fetched content.
    pub fn extract_message(&self, content: &[u8], claim: &UserClaim) -> Result<String> {
        let text = match self {
            Self::Reddit => reddit_post_text(content, claim.name())?,
            _ => String::from_utf8_lossy(content).into_owned(),
        };
        armor::find(&text)
            .map(|msg| msg.to_string())
            .ok_or_else(|| Error::ProofContentInvalid(format!("no message found in {} content", self.as_str())))
    }

    /// Build an echo proof url for a name, key and armored message.
    pub fn echo_url(name: &str, key_id: &KeyID, message: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("test://echo/{}/{}", name, key_id)).map_err(|e| Error::ClaimInvalidUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("m", message);
        Ok(url)
    }
}

/// Reddit hands back a listing. The post we care about is the first child of
/// the first listing, and it has to be written by the account being claimed.
fn reddit_post_text(content: &[u8], name: &str) -> Result<String> {
    let invalid = |msg: &str| Error::ProofContentInvalid(format!("invalid reddit content: {}", msg));
    let listing: serde_json::Value = serde_json::from_slice(content).map_err(|_| invalid("not json"))?;
    let post = listing
        .get(0)
        .and_then(|l| l.get("data"))
        .and_then(|d| d.get("children"))
        .and_then(|c| c.get(0))
        .and_then(|p| p.get("data"))
        .ok_or_else(|| invalid("no post"))?;
    let author = post.get("author").and_then(|a| a.as_str()).ok_or_else(|| invalid("no author"))?;
    if !author.eq_ignore_ascii_case(name) {
        Err(invalid("author mismatch"))?;
    }
    let text = post.get("selftext").and_then(|t| t.as_str()).ok_or_else(|| invalid("no text"))?;
    Ok(text.to_string())
}

impl FromStr for Service {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "github" => Ok(Self::Github),
            "reddit" => Ok(Self::Reddit),
            "https" => Ok(Self::Https),
            "echo" => Ok(Self::Echo),
            _ => Err(Error::ClaimInvalidService(s.to_string())),
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
