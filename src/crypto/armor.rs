//! Armoring turns binary data (generally a serialized [Signature][crate::crypto::sign::Signature])
//! into a block of text that survives being pasted into a web page.
//!
//! ```text
//! BEGIN MESSAGE.
//! kXdyh2uOOoF0Kw8 Pvas2sd09BbxMj5 ...
//! ... GVtc2.
//! END MESSAGE.
//! ```
//!
//! The body is url-safe base64 chopped into words. Services love to mangle
//! text (wrapping lines, inserting links, escaping things) so when reading
//! a block back we find it by its markers and then only trust characters from
//! the base64 alphabet, skipping anything that looks like markup.

use crate::{
    error::{Error, Result},
    util::ser,
};

/// Marks the start of an armored block.
pub const BEGIN: &str = "BEGIN MESSAGE.";
/// Marks the end of an armored block.
pub const END: &str = "END MESSAGE.";

const WORD_LEN: usize = 15;
const WORDS_PER_LINE: usize = 10;

/// Armor some bytes.
pub fn armor(bytes: &[u8]) -> String {
    let encoded = ser::base64_encode(bytes);
    let words = encoded
        .as_bytes()
        .chunks(WORD_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>();
    let body = words
        .chunks(WORDS_PER_LINE)
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n{}.\n{}", BEGIN, body, END)
}

/// Find the first armored block in some content, returning it (markers
/// included) without touching what's inside.
pub fn find(content: &str) -> Option<&str> {
    let start = content.find(BEGIN)?;
    let end = content[start + BEGIN.len()..].find(END)? + start + BEGIN.len() + END.len();
    Some(&content[start..end])
}

/// Pull the bytes back out of an armored block.
///
/// The block can be surrounded by (and sprinkled with) html tags, entities
/// and whitespace.
pub fn dearmor(armored: &str) -> Result<Vec<u8>> {
    let block = find(armored).ok_or(Error::BadLength)?;
    let body = &block[BEGIN.len()..block.len() - END.len()];
    let mut encoded = String::with_capacity(body.len());
    let mut in_tag = false;
    let mut in_entity = false;
    for ch in body.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => in_entity = true,
            ';' if in_entity => in_entity = false,
            _ if in_tag || in_entity => {}
            // the body ends at the first period outside of markup
            '.' => break,
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' => encoded.push(ch),
            _ => {}
        }
    }
    if encoded.is_empty() {
        Err(Error::BadLength)?;
    }
    ser::base64_decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armor_dearmor() {
        let data = (0..200u8).collect::<Vec<_>>();
        let armored = armor(&data);
        assert!(armored.starts_with("BEGIN MESSAGE.\n"));
        assert!(armored.ends_with(".\nEND MESSAGE."));
        let first_line = armored.lines().nth(1).unwrap();
        assert_eq!(first_line.split(' ').count(), WORDS_PER_LINE);
        assert!(first_line.split(' ').all(|w| w.len() == WORD_LEN));
        assert_eq!(dearmor(&armored).unwrap(), data);
    }

    #[test]
    fn dearmor_in_html() {
        let data = b"get a job".to_vec();
        let armored = armor(&data);
        let html = format!(
            "<html><body><div class=\"tweet\"><p>{}</p></div></body></html>",
            armored.replace('\n', "<br/>\n&nbsp; ")
        );
        assert_eq!(find(&html).map(|x| x.starts_with(BEGIN)), Some(true));
        assert_eq!(dearmor(&html).unwrap(), data);
    }

    #[test]
    fn dearmor_missing_or_empty() {
        assert_eq!(find("hello there"), None);
        assert_eq!(find("BEGIN MESSAGE. nope"), None);
        assert_eq!(dearmor("hello there").err(), Some(Error::BadLength));
        assert_eq!(dearmor("BEGIN MESSAGE.\n.\nEND MESSAGE.").err(), Some(Error::BadLength));
        assert!(dearmor("BEGIN MESSAGE.\nA.\nEND MESSAGE.").is_err());
    }
}
