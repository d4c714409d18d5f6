//! Binary module images.
//!
//! A module image carries the metadata the loader cares about (the module's
//! own name and version and its reference table) followed by an opaque
//! payload with the code and resources. Only the metadata is ever rewritten;
//! the payload is carried through untouched.
//!
//! # Layout (little endian)
//!
//! ```text
//! "HMOD"            magic
//! u16               format version (1)
//! u32 + bytes       module name (UTF-8)
//! 4 x u16           module version
//! u32               reference count
//!   u32 + bytes     reference name
//!   4 x u16         reference version
//!   [u8; 8]         public key token
//! u32 + bytes       payload
//! ```
//!
//! Reading and writing are exact inverses, so a module that was not
//! modified is written back byte for byte.

use crate::error::Result;
use binrw::{binrw, BinRead, BinWrite};
use camino::Utf8Path;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

pub const MODULE_FORMAT_VERSION: u16 = 1;

/// Length and count prefixes are u32; anything longer cannot be written.
fn length_prefix(len: usize) -> std::result::Result<u32, std::num::TryFromIntError> {
    u32::try_from(len)
}

/// Four-part module version, ordered component-wise.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ModuleVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl ModuleVersion {
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for ModuleVersion {
    type Err = String;

    /// Parses `major[.minor[.build[.revision]]]`; missing parts are zero.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = [0u16; 4];
        let mut count = 0;
        for (i, part) in s.trim().split('.').enumerate() {
            if i >= 4 {
                return Err(format!("too many version components in '{s}'"));
            }
            parts[i] = part
                .parse()
                .map_err(|_| format!("invalid version component '{part}' in '{s}'"))?;
            count += 1;
        }
        if count == 0 {
            return Err("empty version".to_string());
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

/// One entry of a module's reference table.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct ModuleReference {
    #[br(temp)]
    #[bw(try_calc = length_prefix(name.len()))]
    name_len: u32,
    #[br(count = name_len, try_map = String::from_utf8)]
    #[bw(map = |s| s.as_bytes().to_vec())]
    pub name: String,

    pub version: ModuleVersion,
    pub public_key_token: [u8; 8],
}

impl ModuleReference {
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Self {
        Self {
            name: name.into(),
            version,
            public_key_token: [0; 8],
        }
    }
}

/// A parsed managed module.
#[binrw]
#[brw(little, magic = b"HMOD")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    #[br(assert(format_version == MODULE_FORMAT_VERSION, "unsupported module format {}", format_version))]
    format_version: u16,

    #[br(temp)]
    #[bw(try_calc = length_prefix(name.len()))]
    name_len: u32,
    #[br(count = name_len, try_map = String::from_utf8)]
    #[bw(map = |s| s.as_bytes().to_vec())]
    pub name: String,

    pub version: ModuleVersion,

    #[br(temp)]
    #[bw(try_calc = length_prefix(references.len()))]
    reference_count: u32,
    #[br(count = reference_count)]
    pub references: Vec<ModuleReference>,

    #[br(temp)]
    #[bw(try_calc = length_prefix(payload.len()))]
    payload_len: u32,
    #[br(count = payload_len)]
    pub payload: Vec<u8>,
}

impl ModuleImage {
    pub fn new(name: impl Into<String>, version: ModuleVersion) -> Self {
        Self {
            format_version: MODULE_FORMAT_VERSION,
            name: name.into(),
            version,
            references: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_reference(mut self, reference: ModuleReference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        Ok(Self::read(&mut cursor)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn reference(&self, name: &str) -> Option<&ModuleReference> {
        self.references.iter().find(|r| r.name == name)
    }

    pub fn reference_mut(&mut self, name: &str) -> Option<&mut ModuleReference> {
        self.references.iter_mut().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> ModuleImage {
        ModuleImage::new("MyMod", ModuleVersion::new(1, 2, 3, 4))
            .with_reference(ModuleReference::new("0Harmony", ModuleVersion::new(1, 2, 0, 1)))
            .with_reference(ModuleReference::new("mscorlib", ModuleVersion::new(2, 0, 0, 0)))
            .with_payload(vec![0xde, 0xad, 0xbe, 0xef])
    }

    #[test]
    fn test_parse_serialized_module() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"HMOD");

        let parsed = ModuleImage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name, "MyMod");
        assert_eq!(parsed.references.len(), 2);
        assert_eq!(
            parsed.reference("0Harmony").unwrap().version,
            ModuleVersion::new(1, 2, 0, 1)
        );
        assert_eq!(parsed.payload, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ModuleImage::from_bytes(b"MZ\x90\x00not a module").is_err());
        assert!(ModuleImage::from_bytes(b"").is_err());
    }

    #[test]
    fn test_rejects_unknown_format_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = 9;
        assert!(ModuleImage::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_length_prefix_limit() {
        assert_eq!(length_prefix(0).unwrap(), 0);
        assert_eq!(length_prefix(u32::MAX as usize).unwrap(), u32::MAX);
        if let Ok(too_long) = usize::try_from(u64::from(u32::MAX) + 1) {
            assert!(length_prefix(too_long).is_err());
        }
    }

    #[test]
    fn test_version_parse_and_order() {
        let v: ModuleVersion = "2.0.4".parse().unwrap();
        assert_eq!(v, ModuleVersion::new(2, 0, 4, 0));
        assert_eq!(v.to_string(), "2.0.4.0");
        assert!(ModuleVersion::new(1, 2, 0, 0) < ModuleVersion::new(1, 10, 0, 0));
        assert!("1.x".parse::<ModuleVersion>().is_err());
        assert!("1.2.3.4.5".parse::<ModuleVersion>().is_err());
    }

    proptest! {
        #[test]
        fn test_unmodified_module_is_byte_identical(
            name in "[A-Za-z0-9.]{1,24}",
            version: ModuleVersion,
            references: Vec<ModuleReference>,
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut module = ModuleImage::new(name, version).with_payload(payload);
            module.references = references;
            let bytes = module.to_bytes().unwrap();
            let reparsed = ModuleImage::from_bytes(&bytes).unwrap();
            prop_assert_eq!(&reparsed, &module);
            prop_assert_eq!(reparsed.to_bytes().unwrap(), bytes);
        }
    }
}
