//! The user verification engine.
//!
//! [Users] walks a sigchain's active user claims, fetches each proof, checks
//! it, and caches a [UserResult] per claim. Everything else (lookups by key,
//! by address, searches) is answered from that cache.
//!
//! Two index families are kept in the document store:
//!
//! - `user/<key_id>/<service>/<name>` holds the results for a key
//! - `user-index/<name>@<service>/<key_id>` holds the same results, keyed by
//!   address, so finding who owns an account doesn't mean scanning every key
//!
//! Both are rewritten together, in one batch, on every update.

use crate::{
    clock::{Clock, SystemClock},
    config::Config,
    context::Context,
    crypto::base::KeyID,
    docs::{Documents, Write},
    error::{Error, Result},
    request::Requestor,
    sigchain::{Sigchain, Sigchains, StatementKind},
    user::{Service, UserClaim, UserResult},
    util::{ser, Timestamp},
};
use getset;
use serde_derive::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

const RESULTS: &str = "user";
const INDEX: &str = "user-index";

fn results_prefix(key_id: &KeyID) -> String {
    format!("{}/{}/", RESULTS, key_id)
}

fn results_key(claim: &UserClaim) -> String {
    format!("{}{}/{}", results_prefix(claim.key_id()), claim.service(), claim.name())
}

fn index_prefix(address: &str) -> String {
    format!("{}/{}/", INDEX, address)
}

fn index_key(claim: &UserClaim) -> String {
    format!("{}{}", index_prefix(&claim.address()), claim.key_id())
}

/// Split `name@service` and normalize the name.
fn parse_address(address: &str) -> Result<(String, Service)> {
    let invalid = || Error::ClaimInvalidAddress(address.to_string());
    let (name, service) = address.trim().rsplit_once('@').ok_or_else(invalid)?;
    let service = Service::from_str(service).map_err(|_| invalid())?;
    let name = service.normalize_name(name);
    service.validate_name(&name).map_err(|_| invalid())?;
    Ok((name, service))
}

fn decode_results(rows: Vec<(String, Vec<u8>)>) -> Result<Vec<UserResult>> {
    rows.into_iter().map(|(_, bytes)| ser::deserialize(&bytes)).collect()
}

/// One async mutex per key, so two updates for the same key never overlap
/// while updates for different keys run side by side.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<KeyID, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    fn get(&self, key_id: &KeyID) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| Error::StoreLockPoisoned)?;
        // nobody else holds (or waits on) a lock with a single reference
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks.entry(key_id.clone()).or_default().clone())
    }
}

/// A user search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, getset::Getters)]
#[getset(get = "pub")]
pub struct SearchRequest {
    /// Matched (case-insensitively) against `name@service`. Empty matches
    /// everything.
    query: String,
    /// How many keys to return. Falls back to the configured search limit.
    limit: Option<usize>,
}

impl SearchRequest {
    pub fn new<T: Into<String>>(query: T) -> Self {
        Self {
            query: query.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// All the cached results for one key that matched a search.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct SearchResult {
    key_id: KeyID,
    results: Vec<UserResult>,
}

/// Builds a [Users] engine.
pub struct UsersBuilder {
    docs: Arc<dyn Documents>,
    sigchains: Sigchains,
    requestor: Option<Arc<dyn Requestor>>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl UsersBuilder {
    /// Where proofs get fetched from. Defaults to an [HttpRequestor][crate::request::HttpRequestor]
    /// when the `http` feature is on.
    pub fn requestor(mut self, requestor: Arc<dyn Requestor>) -> Self {
        self.requestor = Some(requestor);
        self
    }

    /// Where timestamps come from. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Users> {
        let requestor = match self.requestor {
            Some(requestor) => requestor,
            None => default_requestor(&self.config)?,
        };
        Ok(Users {
            docs: self.docs,
            sigchains: self.sigchains,
            requestor,
            clock: self.clock,
            config: self.config,
            locks: KeyLocks::default(),
        })
    }
}

#[cfg(feature = "http")]
fn default_requestor(config: &Config) -> Result<Arc<dyn Requestor>> {
    Ok(Arc::new(crate::request::HttpRequestor::new(config)?))
}

#[cfg(not(feature = "http"))]
fn default_requestor(_config: &Config) -> Result<Arc<dyn Requestor>> {
    Err(Error::Config("no requestor given and the http feature is off".into()))
}

/// Verifies user claims and caches the results.
pub struct Users {
    docs: Arc<dyn Documents>,
    sigchains: Sigchains,
    requestor: Arc<dyn Requestor>,
    clock: Arc<dyn Clock>,
    config: Config,
    locks: KeyLocks,
}

impl Users {
    /// Start building an engine on top of a document store and the sigchains
    /// kept in it.
    pub fn builder(docs: Arc<dyn Documents>, sigchains: Sigchains) -> UsersBuilder {
        UsersBuilder {
            docs,
            sigchains,
            requestor: None,
            clock: Arc::new(SystemClock),
            config: Config::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sigchains(&self) -> &Sigchains {
        &self.sigchains
    }

    /// Check one claim against its proof. This never fails: whatever goes
    /// wrong ends up in the result's status and error.
    pub async fn request_verify(&self, ctx: &Context, claim: &UserClaim) -> UserResult {
        let res = self.verify(ctx, claim).await;
        let now = self.clock.now();
        match res {
            Ok(()) => {
                debug!(address = %claim.address(), key_id = %claim.key_id(), "users: verified");
                UserResult::ok(claim.clone(), now)
            }
            Err(err) => {
                let result = UserResult::failed(claim.clone(), &err, now);
                warn!(address = %claim.address(), key_id = %claim.key_id(), status = %result.status(), %err, "users: verify failed");
                result
            }
        }
    }

    async fn verify(&self, ctx: &Context, claim: &UserClaim) -> Result<()> {
        let service = claim.service();
        let url = claim.url();
        service.validate_path(url, claim)?;
        let content = match service.inline_content(url)? {
            Some(content) => content,
            None => {
                let request_url = service
                    .request_url(url)?
                    .ok_or_else(|| Error::ProofPathInvalid(format!("nothing to fetch for url {}", url)))?;
                debug!(url = %request_url, "users: fetching proof");
                self.requestor.get(ctx, &request_url).await?
            }
        };
        if content.len() > *self.config.max_content_bytes() {
            Err(Error::ProofContentInvalid(format!("content too large ({} bytes)", content.len())))?;
        }
        let message = service.extract_message(&content, claim)?;
        claim.verify_message(&message)
    }

    /// Verify every active user claim in a chain, in chain order.
    ///
    /// Statements whose claim can't be read are skipped. Claims that don't
    /// agree with their statement get a [Failure][crate::user::Status::Failure]
    /// result without anything being fetched. Stops with the context's error
    /// if the context is done.
    pub async fn check_sigchain(&self, ctx: &Context, chain: &Sigchain) -> Result<Vec<UserResult>> {
        let mut results = Vec::new();
        for statement in chain.active(StatementKind::User) {
            ctx.check()?;
            let claim = match UserClaim::from_statement(statement) {
                Ok(claim) => claim,
                Err(err) => {
                    warn!(owner = %chain.owner(), sequence = statement.sequence(), %err, "users: skipping unreadable claim");
                    continue;
                }
            };
            let result = match claim.check_statement(statement) {
                Ok(()) => self.request_verify(ctx, &claim).await,
                Err(err) => {
                    warn!(address = %claim.address(), sequence = statement.sequence(), %err, "users: claim does not match its statement");
                    UserResult::failed(claim, &err, self.clock.now())
                }
            };
            results.push(result);
        }
        ctx.check()?;
        Ok(results)
    }

    /// Re-check a key's claims and replace its cached results.
    ///
    /// A key with no stored sigchain ends up with no results. When a claim
    /// that verified before fails now, its result keeps the old `verified_at`.
    /// If the context finishes first, nothing is written.
    pub async fn update(&self, ctx: &Context, key_id: &KeyID) -> Result<Vec<UserResult>> {
        ctx.check()?;
        let lock = self.locks.get(key_id)?;
        let _guard = ctx.run(async { Ok(lock.lock_owned().await) }).await?;

        let chain = match self.sigchains.sigchain(key_id) {
            Ok(chain) => Some(chain),
            Err(Error::ChainNotFound(_)) => None,
            Err(err) => return Err(err),
        };
        let mut results = match chain.as_ref() {
            Some(chain) => self.check_sigchain(ctx, chain).await?,
            None => Vec::new(),
        };

        let previous = self.get(ctx, key_id)?;
        for result in results.iter_mut().filter(|r| !r.is_ok()) {
            let prior = previous
                .iter()
                .find(|p| p.user().service() == result.user().service() && p.user().name() == result.user().name());
            if let Some(prior) = prior {
                result.set_verified_at(prior.verified_at().clone());
            }
        }

        let mut batch = Vec::with_capacity((previous.len() + results.len()) * 2);
        for prior in &previous {
            batch.push(Write::Delete(results_key(prior.user())));
            batch.push(Write::Delete(index_key(prior.user())));
        }
        for result in &results {
            let bytes = ser::serialize(result)?;
            batch.push(Write::Put(results_key(result.user()), bytes.clone()));
            batch.push(Write::Put(index_key(result.user()), bytes));
        }
        ctx.check()?;
        self.docs.apply(batch)?;
        info!(
            %key_id,
            results = results.len(),
            ok = results.iter().filter(|r| r.is_ok()).count(),
            "users: updated"
        );
        Ok(results)
    }

    /// Look for another key that already owns (verified) one of the accounts
    /// this chain claims. Returns the first one found.
    pub fn check_for_existing(&self, ctx: &Context, chain: &Sigchain) -> Result<Option<KeyID>> {
        ctx.check()?;
        for claim in UserClaim::find_in_sigchain(chain)? {
            let results = decode_results(self.docs.list(&index_prefix(&claim.address()))?)?;
            let existing = results.into_iter().find(|r| r.is_ok() && r.user().key_id() != chain.owner());
            if let Some(existing) = existing {
                debug!(address = %claim.address(), existing = %existing.user().key_id(), "users: account already claimed");
                return Ok(Some(existing.user().key_id().clone()));
            }
        }
        Ok(None)
    }

    /// The cached results for a key, in claim (sequence) order.
    pub fn get(&self, ctx: &Context, key_id: &KeyID) -> Result<Vec<UserResult>> {
        ctx.check()?;
        let mut results = decode_results(self.docs.list(&results_prefix(key_id))?)?;
        results.sort_by_key(|r| *r.user().sequence());
        Ok(results)
    }

    /// The cached result for an address (`name@service`). If several keys
    /// claim the account, a verified claim wins, then the lowest key id.
    pub fn user(&self, ctx: &Context, address: &str) -> Result<Option<UserResult>> {
        ctx.check()?;
        let (name, service) = parse_address(address)?;
        let mut results = decode_results(self.docs.list(&index_prefix(&format!("{}@{}", name, service)))?)?;
        results.sort_by(|a, b| a.user().key_id().cmp(b.user().key_id()));
        let found = results.iter().find(|r| r.is_ok()).or_else(|| results.first()).cloned();
        Ok(found)
    }

    /// Every key with cached results, sorted.
    pub fn kids(&self, ctx: &Context) -> Result<Vec<KeyID>> {
        ctx.check()?;
        let mut kids = BTreeSet::new();
        for (key, _) in self.docs.list(&format!("{}/", RESULTS))? {
            if let Some(kid) = key.split('/').nth(1) {
                kids.insert(KeyID::try_from(kid)?);
            }
        }
        Ok(kids.into_iter().collect())
    }

    /// Find keys with a cached result whose address contains the query.
    /// Keys come back in key id order, results in claim order.
    pub fn search(&self, ctx: &Context, req: &SearchRequest) -> Result<Vec<SearchResult>> {
        ctx.check()?;
        let query = req.query().trim().to_lowercase();
        let limit = req.limit().unwrap_or(*self.config.search_limit());
        let mut matched: BTreeMap<KeyID, Vec<UserResult>> = BTreeMap::new();
        for result in decode_results(self.docs.list(&format!("{}/", RESULTS))?)? {
            if !query.is_empty() && !result.user().address().contains(&query) {
                continue;
            }
            let key_id = result.user().key_id().clone();
            matched.entry(key_id).or_default().push(result);
        }
        let found = matched
            .into_iter()
            .take(limit)
            .map(|(key_id, mut results)| {
                results.sort_by_key(|r| *r.user().sequence());
                SearchResult { key_id, results }
            })
            .collect::<Vec<_>>();
        debug!(query = %query, found = found.len(), "users: search");
        Ok(found)
    }

    /// Keys whose newest cached result was checked before `older_than`.
    pub fn expired(&self, ctx: &Context, older_than: &Timestamp) -> Result<Vec<KeyID>> {
        ctx.check()?;
        let mut newest: BTreeMap<KeyID, Timestamp> = BTreeMap::new();
        for result in decode_results(self.docs.list(&format!("{}/", RESULTS))?)? {
            let checked = newest.entry(result.user().key_id().clone()).or_insert_with(|| result.timestamp().clone());
            if *result.timestamp() > *checked {
                *checked = result.timestamp().clone();
            }
        }
        Ok(newest
            .into_iter()
            .filter(|(_, checked)| checked < older_than)
            .map(|(key_id, _)| key_id)
            .collect())
    }
}
