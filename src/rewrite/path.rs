//! Windows path references and their translation to VM share paths.
//!
//! A path reference is a drive letter, a colon, a slash or backslash, and a
//! remainder:
//!
//! ```text
//! C:\data\db        drive = C, sub_path = data\db
//! d:/projects/app   drive = d, sub_path = projects/app
//! ```
//!
//! Bind entries additionally carry a suffix (`:/app:ro`) starting at the first
//! colon after the drive separator. Environment values have no suffix; the whole
//! remainder is the sub-path.

/// A drive-letter path found in a bind entry or environment value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathReference<'a> {
    /// Drive letter as written (case preserved).
    pub drive: char,
    /// Path below the drive root, separators untouched.
    pub sub_path: &'a str,
    /// Text following the sub-path, kept verbatim (bind entries only).
    pub suffix: &'a str,
}

impl<'a> PathReference<'a> {
    /// Parse the source half of a bind entry: `<drive>:<sep><sub_path>[:<rest>]`.
    ///
    /// The sub-path runs up to the next colon and must not be empty; everything
    /// from that colon on is the suffix.
    pub fn parse_bind(entry: &'a str) -> Option<Self> {
        let (drive, rest) = split_drive(entry)?;
        let end = rest.find(':').unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        Some(Self {
            drive,
            sub_path: &rest[..end],
            suffix: &rest[end..],
        })
    }

    /// Parse an environment value: `<drive>:<sep><sub_path>`.
    ///
    /// The sub-path may be empty and may contain colons.
    pub fn parse_value(value: &'a str) -> Option<Self> {
        let (drive, rest) = split_drive(value)?;
        Some(Self {
            drive,
            sub_path: rest,
            suffix: "",
        })
    }

    /// Translate this reference under `base`, appending the suffix unchanged.
    pub fn translate(&self, base: &str) -> String {
        let mut out = translate(base, self.drive, self.sub_path);
        out.push_str(self.suffix);
        out
    }
}

/// Split `X:\` or `X:/` off the front of `s`.
fn split_drive(s: &str) -> Option<(char, &str)> {
    let bytes = s.as_bytes();
    if bytes.len() < 3 {
        return None;
    }
    if !bytes[0].is_ascii_alphabetic() || bytes[1] != b':' || !matches!(bytes[2], b'\\' | b'/') {
        return None;
    }
    // First three bytes are ASCII, so slicing at 3 is a char boundary.
    Some((bytes[0] as char, &s[3..]))
}

/// Map `(base, drive, sub_path)` to `base/` + `DRIVE` + `/` + `sub_path` with
/// forward slashes.
///
/// `base` is normalized to end in exactly one `/`. Never fails.
pub fn translate(base: &str, drive: char, sub_path: &str) -> String {
    let base = base.trim_end_matches('/');
    let sub_path = sub_path.replace('\\', "/");
    let mut out = String::with_capacity(base.len() + sub_path.len() + 3);
    out.push_str(base);
    out.push('/');
    out.push(drive.to_ascii_uppercase());
    out.push('/');
    out.push_str(&sub_path);
    out
}
