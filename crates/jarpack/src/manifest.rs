//! Jar manifest (META-INF/MANIFEST.MF)
//!
//! Only the main section is modelled. Output uses the jar manifest syntax:
//! `Name: value` lines terminated by CRLF, wrapped at 72 bytes with a single
//! leading space on continuation lines, followed by an empty line.

use thiserror::Error;

/// Archive path of the manifest entry
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Directory entry that precedes the manifest
pub const MANIFEST_DIR: &str = "META-INF/";

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const MAIN_CLASS: &str = "Main-Class";
pub const CREATED_BY: &str = "Created-By";

/// Maximum line length in bytes, line terminator excluded
const MAX_LINE_BYTES: usize = 72;

/// Maximum attribute name length
const MAX_NAME_BYTES: usize = 70;

/// Errors that can occur while building or parsing a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Attribute name uses characters outside `[A-Za-z0-9_-]` or is too long
    #[error("Invalid attribute name: {0:?}")]
    InvalidName(String),

    /// Attribute value contains a line break or NUL
    #[error("Invalid value for attribute {0}: line breaks are not allowed")]
    InvalidValue(String),

    /// Attribute is always written by the bundler and cannot be overridden
    #[error("Attribute {0} is managed by jarpack and cannot be set")]
    Reserved(String),

    /// Input could not be parsed
    #[error("Malformed manifest at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// Manifest bytes are not UTF-8
    #[error("Manifest is not valid UTF-8")]
    Encoding,
}

/// Main-section attributes of a jar manifest, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<(String, String)>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest for an executable jar launching `main_class`
    pub fn executable(main_class: &str) -> Result<Self, ManifestError> {
        let mut manifest = Self::new();
        manifest.set(MANIFEST_VERSION, "1.0")?;
        manifest.set(MAIN_CLASS, main_class)?;
        manifest.set(
            CREATED_BY,
            &format!("jarpack {}", env!("CARGO_PKG_VERSION")),
        )?;
        Ok(manifest)
    }

    /// Look up an attribute; names are case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn main_class(&self) -> Option<&str> {
        self.get(MAIN_CLASS)
    }

    /// Set an attribute, replacing an existing one in place
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ManifestError> {
        if !is_valid_attribute_name(name) {
            return Err(ManifestError::InvalidName(name.to_string()));
        }
        if value.contains(['\r', '\n', '\0']) {
            return Err(ManifestError::InvalidValue(name.to_string()));
        }

        match self
            .attributes
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Serialize to manifest syntax
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.attributes {
            write_wrapped(&mut out, &format!("{}: {}", name, value));
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Parse the main section of a manifest.
    ///
    /// Accepts CRLF or LF line endings. Parsing stops at the first empty
    /// line; per-entry sections are ignored. Continuation lines are joined
    /// before decoding, since older jar tools wrap inside multi-byte
    /// characters.
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let mut logical: Vec<(usize, Vec<u8>)> = Vec::new();

        for (i, raw) in bytes.split(|&b| b == b'\n').enumerate() {
            let line = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line_no = i + 1;

            if line.is_empty() {
                break;
            }

            if let Some(continuation) = line.strip_prefix(b" ") {
                match logical.last_mut() {
                    Some((_, joined)) => joined.extend_from_slice(continuation),
                    None => {
                        return Err(ManifestError::Malformed {
                            line: line_no,
                            reason: "continuation line without attribute".to_string(),
                        })
                    }
                }
                continue;
            }

            logical.push((line_no, line.to_vec()));
        }

        let mut attributes: Vec<(String, String)> = Vec::with_capacity(logical.len());
        for (line_no, joined) in logical {
            let line = String::from_utf8(joined).map_err(|_| ManifestError::Encoding)?;
            let (name, value) = line.split_once(':').ok_or_else(|| ManifestError::Malformed {
                line: line_no,
                reason: "expected `Name: value`".to_string(),
            })?;
            if !is_valid_attribute_name(name) {
                return Err(ManifestError::Malformed {
                    line: line_no,
                    reason: format!("invalid attribute name {:?}", name),
                });
            }
            let value = value.strip_prefix(' ').unwrap_or(value);
            attributes.push((name.to_string(), value.to_string()));
        }

        Ok(Self { attributes })
    }
}

/// Whether `name` is the manifest entry, compared the way jar tools do
pub fn is_manifest_path(name: &str) -> bool {
    name.eq_ignore_ascii_case(MANIFEST_PATH)
}

/// Attributes written by the bundler itself
pub fn is_reserved_attribute(name: &str) -> bool {
    [MANIFEST_VERSION, MAIN_CLASS, CREATED_BY]
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Header names: 1 to 70 bytes of `[A-Za-z0-9_-]`
pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_BYTES
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn write_wrapped(out: &mut Vec<u8>, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE_BYTES;

    loop {
        if rest.len() <= limit {
            out.extend_from_slice(rest.as_bytes());
            out.extend_from_slice(b"\r\n");
            return;
        }

        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.extend_from_slice(rest[..cut].as_bytes());
        out.extend_from_slice(b"\r\n ");
        rest = &rest[cut..];
        // The leading space counts toward the line
        limit = MAX_LINE_BYTES - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_manifest() {
        let manifest = Manifest::executable("fr.alexandredch.pcl.Application").unwrap();
        assert_eq!(manifest.get("Manifest-Version"), Some("1.0"));
        assert_eq!(
            manifest.main_class(),
            Some("fr.alexandredch.pcl.Application")
        );
        assert!(manifest.get(CREATED_BY).unwrap().starts_with("jarpack "));
    }

    #[test]
    fn test_to_bytes_format() {
        let mut manifest = Manifest::new();
        manifest.set("Manifest-Version", "1.0").unwrap();
        manifest.set("Main-Class", "App").unwrap();
        assert_eq!(
            manifest.to_bytes(),
            b"Manifest-Version: 1.0\r\nMain-Class: App\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_long_values_wrap_at_72_bytes() {
        let mut manifest = Manifest::new();
        let value = "x".repeat(200);
        manifest.set("Class-Path", &value).unwrap();
        let bytes = manifest.to_bytes();
        let text = String::from_utf8(bytes.clone()).unwrap();

        for line in text.split("\r\n") {
            assert!(line.len() <= 72, "line too long: {}", line.len());
        }

        let parsed = Manifest::parse(&bytes).unwrap();
        assert_eq!(parsed.get("Class-Path"), Some(value.as_str()));
    }

    #[test]
    fn test_wrap_respects_char_boundaries() {
        let mut manifest = Manifest::new();
        let value = "é".repeat(60);
        manifest.set("Implementation-Title", &value).unwrap();
        let parsed = Manifest::parse(&manifest.to_bytes()).unwrap();
        assert_eq!(parsed.get("Implementation-Title"), Some(value.as_str()));
    }

    #[test]
    fn test_parse_value_wrapped_inside_a_character() {
        // "Implementation-Title: " is 22 bytes, so byte 71 falls inside an é
        let line = format!("Implementation-Title: {}", "é".repeat(30));
        let bytes = line.as_bytes();
        let mut wrapped = bytes[..71].to_vec();
        wrapped.extend_from_slice(b"\r\n ");
        wrapped.extend_from_slice(&bytes[71..]);
        wrapped.extend_from_slice(b"\r\nMain-Class: App\r\n\r\n");
        assert!(std::str::from_utf8(&wrapped).is_err());

        let manifest = Manifest::parse(&wrapped).unwrap();
        assert_eq!(
            manifest.get("Implementation-Title"),
            Some("é".repeat(30).as_str())
        );
        assert_eq!(manifest.main_class(), Some("App"));
    }

    #[test]
    fn test_set_replaces_case_insensitively() {
        let mut manifest = Manifest::new();
        manifest.set("Main-Class", "Old").unwrap();
        manifest.set("main-class", "New").unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.main_class(), Some("New"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut manifest = Manifest::new();
        assert!(matches!(
            manifest.set("Bad Name", "x"),
            Err(ManifestError::InvalidName(_))
        ));
        assert!(matches!(
            manifest.set("Main-Class", "a\nb"),
            Err(ManifestError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_parse_lf_and_sections() {
        let text = "Manifest-Version: 1.0\nMain-Class: com.example.Main\n\nName: foo/\nSealed: true\n";
        let manifest = Manifest::parse(text.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.main_class(), Some("com.example.Main"));
        assert_eq!(manifest.get("Sealed"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Manifest::parse(b" orphan\r\n"),
            Err(ManifestError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            Manifest::parse(b"Manifest-Version: 1.0\r\nno colon here\r\n"),
            Err(ManifestError::Malformed { line: 2, .. })
        ));
        assert!(matches!(
            Manifest::parse(&[0xff, 0xfe]),
            Err(ManifestError::Encoding)
        ));
    }

    #[test]
    fn test_reserved_and_manifest_path() {
        assert!(is_reserved_attribute("main-class"));
        assert!(!is_reserved_attribute("Class-Path"));
        assert!(is_manifest_path("META-INF/MANIFEST.MF"));
        assert!(is_manifest_path("meta-inf/manifest.mf"));
        assert!(!is_manifest_path("META-INF/MANIFEST.MF.bak"));
    }
}
