//! MON-VER: receiver and software version. The configurator keys the whole
//! command sequence off the software family reported here.

use log::{trace, warn};

const SW_VERSION_LEN: usize = 30;
const HW_VERSION_LEN: usize = 10;
const EXTENSIONS_OFFSET: usize = 40;
const EXTENSION_LEN: usize = 30;

/// Known software families and their tolerance window.
const KNOWN_SW_VERSIONS: [f64; 3] = [1.00, 2.01, 3.01];
const SW_VERSION_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, PartialEq)]
pub struct MonVerParcel {
    valid: bool,
    sw_version: f64,
    extensions: Vec<String>,
}

impl MonVerParcel {
    pub fn parse(payload: &[u8]) -> Self {
        let mut parsed = Self {
            valid: false,
            sw_version: 0.0,
            extensions: Vec::new(),
        };
        if payload.len() < SW_VERSION_LEN + HW_VERSION_LEN {
            trace!("mon-ver payload of {} bytes rejected", payload.len());
            return parsed;
        }

        let Some(version) = find_version(payload) else {
            warn!("mon-ver carries no parsable software version");
            return parsed;
        };
        parsed.sw_version = version;
        parsed.extensions = parse_extensions(payload);

        if KNOWN_SW_VERSIONS
            .iter()
            .any(|known| (known - version).abs() < SW_VERSION_EPSILON)
        {
            parsed.valid = true;
        } else {
            warn!("unknown receiver software version {version:.2}");
        }
        parsed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn sw_version(&self) -> f64 {
        self.sw_version
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// First `d.dd` pattern anywhere in the version strings.
fn find_version(payload: &[u8]) -> Option<f64> {
    payload.windows(4).find_map(|window| {
        let digits = window[0].is_ascii_digit()
            && window[1] == b'.'
            && window[2].is_ascii_digit()
            && window[3].is_ascii_digit();
        if !digits {
            return None;
        }
        std::str::from_utf8(window).ok()?.parse().ok()
    })
}

/// NUL-padded 30-byte extension strings after the fixed block.
fn parse_extensions(payload: &[u8]) -> Vec<String> {
    let mut extensions = Vec::new();
    let mut offset = EXTENSIONS_OFFSET;
    while offset + EXTENSION_LEN <= payload.len() {
        let block = &payload[offset..offset + EXTENSION_LEN];
        let end = block.iter().position(|&b| b == 0).unwrap_or(block.len());
        if let Ok(text) = std::str::from_utf8(&block[..end]) {
            if !text.is_empty() {
                extensions.push(text.to_owned());
            }
        }
        offset += EXTENSION_LEN;
    }
    extensions
}

#[cfg(test)]
pub(crate) fn mon_ver_payload(sw: &str, extensions: &[&str]) -> Vec<u8> {
    let mut payload = vec![0u8; EXTENSIONS_OFFSET + extensions.len() * EXTENSION_LEN];
    payload[..sw.len()].copy_from_slice(sw.as_bytes());
    payload[SW_VERSION_LEN..SW_VERSION_LEN + 5].copy_from_slice(b"00080");
    for (i, ext) in extensions.iter().enumerate() {
        let at = EXTENSIONS_OFFSET + i * EXTENSION_LEN;
        payload[at..at + ext.len()].copy_from_slice(ext.as_bytes());
    }
    payload
}
