//! Text decoding for XML parts.
//!
//! OOXML parts are commonly UTF-8, but XML 1.0 allows UTF-16 and Excel files in the wild
//! sometimes use it. `roxmltree` expects an already-decoded `&str`, so parts are decoded here and
//! the detected [`TextEncoding`] is kept so an edited part can be written back the same way.

use std::borrow::Cow;

use crate::XmlError;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16BE_BOM: [u8; 2] = [0xFE, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Utf16Endian {
    Little,
    Big,
}

/// How a part's bytes were encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextEncoding {
    Utf8 { bom: bool },
    Utf16 { endian: Utf16Endian, bom: bool },
}

#[derive(Debug)]
pub(crate) struct DecodedXml<'a> {
    pub(crate) text: Cow<'a, str>,
    pub(crate) encoding: TextEncoding,
}

/// Decode raw bytes for an XML part.
///
/// Supports:
/// - UTF-8, with or without a BOM (BOM is stripped)
/// - UTF-16LE/UTF-16BE via BOM (`FF FE` / `FE FF`)
/// - UTF-16LE/UTF-16BE via leading `<\0` / `\0<` patterns (optionally preceded by ASCII
///   whitespace when the XML declaration is omitted)
pub(crate) fn decode_xml_bytes(bytes: &[u8]) -> Result<DecodedXml<'_>, XmlError> {
    if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
        return Ok(DecodedXml {
            text: Cow::Borrowed(std::str::from_utf8(rest)?),
            encoding: TextEncoding::Utf8 { bom: true },
        });
    }

    if let Some(rest) = bytes.strip_prefix(&UTF16LE_BOM) {
        return decode_utf16_text(rest, Utf16Endian::Little, true);
    }
    if let Some(rest) = bytes.strip_prefix(&UTF16BE_BOM) {
        return decode_utf16_text(rest, Utf16Endian::Big, true);
    }

    if let Some(endian) = sniff_utf16_without_bom(bytes) {
        return decode_utf16_text(bytes, endian, false);
    }

    Ok(DecodedXml {
        text: Cow::Borrowed(std::str::from_utf8(bytes)?),
        encoding: TextEncoding::Utf8 { bom: false },
    })
}

/// Encode edited text back into the encoding the part was read with.
pub(crate) fn encode_xml_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 { bom } => {
            let mut out = Vec::with_capacity(text.len() + 3);
            if bom {
                out.extend_from_slice(&UTF8_BOM);
            }
            out.extend_from_slice(text.as_bytes());
            out
        }
        TextEncoding::Utf16 { endian, bom } => {
            let mut out = Vec::with_capacity(text.len() * 2 + 2);
            if bom {
                out.extend_from_slice(match endian {
                    Utf16Endian::Little => &UTF16LE_BOM,
                    Utf16Endian::Big => &UTF16BE_BOM,
                });
            }
            for unit in text.encode_utf16() {
                let pair = match endian {
                    Utf16Endian::Little => unit.to_le_bytes(),
                    Utf16Endian::Big => unit.to_be_bytes(),
                };
                out.extend_from_slice(&pair);
            }
            out
        }
    }
}

fn decode_utf16_text(
    bytes: &[u8],
    endian: Utf16Endian,
    bom: bool,
) -> Result<DecodedXml<'static>, XmlError> {
    if bytes.len() % 2 != 0 {
        return Err(XmlError::OddUtf16Length(bytes.len()));
    }

    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| match endian {
            Utf16Endian::Little => u16::from_le_bytes([chunk[0], chunk[1]]),
            Utf16Endian::Big => u16::from_be_bytes([chunk[0], chunk[1]]),
        })
        .collect();

    Ok(DecodedXml {
        text: Cow::Owned(String::from_utf16(&words)?),
        encoding: TextEncoding::Utf16 { endian, bom },
    })
}

fn sniff_utf16_without_bom(bytes: &[u8]) -> Option<Utf16Endian> {
    if bytes.len() < 2 {
        return None;
    }

    if bytes[0] == b'<' && bytes[1] == 0x00 {
        return Some(Utf16Endian::Little);
    }
    if bytes[0] == 0x00 && bytes[1] == b'<' {
        return Some(Utf16Endian::Big);
    }

    // Leading whitespace is only valid when the XML declaration is omitted, but producers in the
    // wild emit it anyway.
    for pair in bytes.chunks_exact(2) {
        match (pair[0], pair[1]) {
            (b'<', 0x00) => return Some(Utf16Endian::Little),
            (0x00, b'<') => return Some(Utf16Endian::Big),
            (a, 0x00) if a.is_ascii_whitespace() => continue,
            (0x00, b) if b.is_ascii_whitespace() => continue,
            _ => return None,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(s: &str) -> Vec<u8> {
        let mut out = UTF16LE_BOM.to_vec();
        for unit in s.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_plain_utf8() {
        let decoded = decode_xml_bytes(b"<worksheet/>").unwrap();
        assert_eq!(decoded.text, "<worksheet/>");
        assert_eq!(decoded.encoding, TextEncoding::Utf8 { bom: false });
    }

    #[test]
    fn strips_and_restores_utf8_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"<worksheet/>");
        let decoded = decode_xml_bytes(&bytes).unwrap();
        assert_eq!(decoded.text, "<worksheet/>");
        assert_eq!(encode_xml_text(&decoded.text, decoded.encoding), bytes);
    }

    #[test]
    fn utf16le_round_trips_with_bom() {
        let bytes = utf16le_with_bom("<worksheet>é</worksheet>");
        let decoded = decode_xml_bytes(&bytes).unwrap();
        assert_eq!(decoded.text, "<worksheet>é</worksheet>");
        assert_eq!(
            decoded.encoding,
            TextEncoding::Utf16 {
                endian: Utf16Endian::Little,
                bom: true
            }
        );
        assert_eq!(encode_xml_text(&decoded.text, decoded.encoding), bytes);
    }

    #[test]
    fn sniffs_utf16be_without_bom_after_whitespace() {
        let mut bytes = Vec::new();
        for unit in " <a/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        let decoded = decode_xml_bytes(&bytes).unwrap();
        assert_eq!(decoded.text, " <a/>");
        assert_eq!(
            decoded.encoding,
            TextEncoding::Utf16 {
                endian: Utf16Endian::Big,
                bom: false
            }
        );
    }

    #[test]
    fn rejects_odd_length_utf16() {
        let err = decode_xml_bytes(&[0xFF, 0xFE, b'<']).unwrap_err();
        assert!(matches!(err, XmlError::OddUtf16Length(1)));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = decode_xml_bytes(&[b'<', 0xC3, 0x28]).unwrap_err();
        assert!(matches!(err, XmlError::Utf8(_)));
    }
}
