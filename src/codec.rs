//! Term codec: `Term ⇄ encoded key` and inline numeric/temporal encoding.
//!
//! Encoded term keys are what gets hashed, stored in `str2id`/`id2str`, and
//! looked up in the dictionary cache. The byte layout is tag-prefixed and
//! NUL-separated so that distinct terms never collide under hashing or
//! lexicographic comparison.

use crate::error::CoreError;
use crate::term::{Literal, LiteralForm, Term, TermId, TermKind};
use unicode_normalization::UnicodeNormalization;

const TAG_URI: u8 = 0x01;
const TAG_BNODE: u8 = 0x02;
const TAG_LITERAL: u8 = 0x03;
const LIT_PLAIN: u8 = 0x00;
const LIT_TYPED: u8 = 0x01;
const LIT_LANG: u8 = 0x02;
const SEP: u8 = 0x00;

/// Normalise a lexical string to NFC, as required before hashing, storing,
/// or cache-lookup of any term.
fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Encode a `Term` into its ordered binary key. Deterministic.
pub fn encode(term: &Term) -> Vec<u8> {
    match term {
        Term::Iri(iri) => {
            let mut out = Vec::with_capacity(1 + iri.len());
            out.push(TAG_URI);
            out.extend(nfc(iri).into_bytes());
            out
        }
        Term::BlankNode(label) => {
            let mut out = Vec::with_capacity(1 + label.len());
            out.push(TAG_BNODE);
            out.extend(label.as_bytes());
            out
        }
        Term::Literal(Literal { lexical, form }) => match form {
            LiteralForm::Plain => {
                let mut out = Vec::with_capacity(2 + lexical.len());
                out.push(TAG_LITERAL);
                out.push(LIT_PLAIN);
                out.extend(nfc(lexical).into_bytes());
                out
            }
            LiteralForm::Typed(datatype) => {
                let mut out = Vec::with_capacity(2 + datatype.len() + 1 + lexical.len());
                out.push(TAG_LITERAL);
                out.push(LIT_TYPED);
                out.extend(datatype.as_bytes());
                out.push(SEP);
                out.extend(nfc(lexical).into_bytes());
                out
            }
            LiteralForm::Lang(lang) => {
                let mut out = Vec::with_capacity(2 + lang.len() + 1 + lexical.len());
                out.push(TAG_LITERAL);
                out.push(LIT_LANG);
                out.extend(lang.to_lowercase().into_bytes());
                out.push(SEP);
                out.extend(nfc(lexical).into_bytes());
                out
            }
        },
    }
}

/// Decode an encoded term key back into a `Term`.
pub fn decode(bytes: &[u8]) -> Result<Term, CoreError> {
    match bytes.first() {
        Some(&TAG_URI) => {
            let s = std::str::from_utf8(&bytes[1..])
                .map_err(|e| CoreError::InvalidEncoding(format!("non-utf8 IRI: {e}")))?;
            Ok(Term::Iri(s.to_string()))
        }
        Some(&TAG_BNODE) => {
            let s = std::str::from_utf8(&bytes[1..])
                .map_err(|e| CoreError::InvalidEncoding(format!("non-utf8 blank node: {e}")))?;
            Ok(Term::BlankNode(s.to_string()))
        }
        Some(&TAG_LITERAL) => {
            let sub = bytes.get(1).ok_or_else(|| {
                CoreError::InvalidEncoding("literal key missing subtype byte".into())
            })?;
            let body = &bytes[2..];
            match *sub {
                LIT_PLAIN => {
                    let value = std::str::from_utf8(body)
                        .map_err(|e| CoreError::InvalidEncoding(format!("non-utf8 literal: {e}")))?;
                    Ok(Term::Literal(Literal::plain(value)))
                }
                LIT_TYPED => {
                    let (datatype, value) = split_on_nul(body)?;
                    Ok(Term::Literal(Literal::typed(value, datatype)))
                }
                LIT_LANG => {
                    let (lang, value) = split_on_nul(body)?;
                    Ok(Term::Literal(Literal::lang(value, lang)))
                }
                other => Err(CoreError::InvalidEncoding(format!(
                    "unknown literal subtype byte {other:#x}"
                ))),
            }
        }
        Some(other) => Err(CoreError::InvalidEncoding(format!(
            "unknown term tag byte {other:#x}"
        ))),
        None => Err(CoreError::InvalidEncoding("empty term key".into())),
    }
}

fn split_on_nul(body: &[u8]) -> Result<(&str, &str), CoreError> {
    let pos = body.iter().position(|b| *b == SEP).ok_or_else(|| {
        CoreError::InvalidEncoding("typed/lang literal body missing separator".into())
    })?;
    let head = std::str::from_utf8(&body[..pos])
        .map_err(|e| CoreError::InvalidEncoding(format!("non-utf8 datatype/lang: {e}")))?;
    let tail = std::str::from_utf8(&body[pos + 1..])
        .map_err(|e| CoreError::InvalidEncoding(format!("non-utf8 literal value: {e}")))?;
    Ok((head, tail))
}

/// Inline integer range: `[-2^59, 2^59)`.
pub const INLINE_INT_MIN: i64 = -(1i64 << 59);
pub const INLINE_INT_MAX_EXCLUSIVE: i64 = 1i64 << 59;

/// Encode an `xsd:integer` inline iff it fits in `[-2^59, 2^59)`.
///
/// The sign is folded into the 60-bit payload by biasing the value by
/// `2^59`, so that ordering of the raw bits matches numeric ordering within
/// the inline-integer range (useful if the dictionary keyspace is ever
/// prefix-scanned).
pub fn encode_integer(i: i64) -> Result<TermId, CoreError> {
    if i < INLINE_INT_MIN || i >= INLINE_INT_MAX_EXCLUSIVE {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    let biased = (i as i128 - INLINE_INT_MIN as i128) as u64;
    Ok(TermId::from_parts(TermKind::Integer, biased))
}

/// Inverse of [`encode_integer`].
pub fn decode_integer(id: TermId) -> i64 {
    debug_assert_eq!(id.kind(), TermKind::Integer);
    (id.value() as i128 + INLINE_INT_MIN as i128) as i64
}

/// A decimal value represented as a scaled integer: `unscaled * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i64,
    pub scale: u8,
}

/// Encode a decimal inline iff `unscaled` (with its scale folded in) fits
/// within 60 bits and carries at least 14 significant digits of precision;
/// otherwise the caller must fall back to the dictionary.
pub fn encode_decimal(d: Decimal) -> Result<TermId, CoreError> {
    if d.scale > 18 {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    let digits = significant_digits(d.unscaled);
    if digits < 14 {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    if d.unscaled < INLINE_INT_MIN || d.unscaled >= INLINE_INT_MAX_EXCLUSIVE {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    // Pack scale into the top 5 bits of the 60-bit payload (scale in
    // [0,18] needs only 5 bits), the remaining 55 bits hold the
    // bias-shifted unscaled magnitude.
    let biased = (d.unscaled as i128 - INLINE_INT_MIN as i128) as u64;
    if biased >> 55 != 0 {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    let packed = (u64::from(d.scale) << 55) | biased;
    Ok(TermId::from_parts(TermKind::Decimal, packed))
}

/// Inverse of [`encode_decimal`].
pub fn decode_decimal(id: TermId) -> Decimal {
    debug_assert_eq!(id.kind(), TermKind::Decimal);
    let raw = id.value();
    let scale = (raw >> 55) as u8;
    let biased = raw & ((1u64 << 55) - 1);
    let unscaled = (biased as i128 + INLINE_INT_MIN as i128) as i64;
    Decimal { unscaled, scale }
}

fn significant_digits(n: i64) -> u32 {
    let n = n.unsigned_abs();
    if n == 0 {
        1
    } else {
        n.ilog10() + 1
    }
}

/// Encode a timestamp (milliseconds since the Unix epoch) inline iff it
/// fits the 60-bit field.
pub fn encode_datetime(epoch_millis: i64) -> Result<TermId, CoreError> {
    if epoch_millis < INLINE_INT_MIN || epoch_millis >= INLINE_INT_MAX_EXCLUSIVE {
        return Err(CoreError::Validation("not_inline_encodable".into()));
    }
    let biased = (epoch_millis as i128 - INLINE_INT_MIN as i128) as u64;
    Ok(TermId::from_parts(TermKind::DateTime, biased))
}

/// Inverse of [`encode_datetime`].
pub fn decode_datetime(id: TermId) -> i64 {
    debug_assert_eq!(id.kind(), TermKind::DateTime);
    (id.value() as i128 + INLINE_INT_MIN as i128) as i64
}

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Try to encode `term` as one of the three inline `TermId` kinds instead of
/// a dictionary entry. Returns `None` when the term is not a candidate at
/// all (wrong datatype, unparseable lexical form, or out of inline range) —
/// callers fall back to the dictionary in that case.
pub fn try_inline_encode(term: &Term) -> Option<TermId> {
    let Term::Literal(Literal { lexical, form: LiteralForm::Typed(datatype) }) = term else {
        return None;
    };
    match datatype.as_str() {
        XSD_INTEGER => lexical.parse::<i64>().ok().and_then(|v| encode_integer(v).ok()),
        XSD_DECIMAL => parse_decimal(lexical).and_then(|d| encode_decimal(d).ok()),
        XSD_DATE_TIME => chrono::DateTime::parse_from_rfc3339(lexical)
            .ok()
            .and_then(|dt| encode_datetime(dt.timestamp_millis()).ok()),
        _ => None,
    }
}

/// Parse an `xsd:decimal` lexical form (`[-]digits[.digits]`) into a scaled
/// integer. Returns `None` for anything not in that shape.
fn parse_decimal(lexical: &str) -> Option<Decimal> {
    let negative = lexical.starts_with('-');
    let unsigned = lexical.trim_start_matches(['-', '+']);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let scale = u8::try_from(frac_part.len()).ok()?;
    let digits = format!("{int_part}{frac_part}");
    let magnitude: i64 = digits.parse().ok()?;
    Some(Decimal { unscaled: if negative { -magnitude } else { magnitude }, scale })
}

/// The type tag of a `TermId`, dictionary-allocated or inline.
pub fn term_type(id: TermId) -> TermKind {
    id.kind()
}

/// True iff `id`'s payload is the literal value itself.
pub fn inline_encoded(id: TermId) -> bool {
    id.is_inline_encoded()
}
