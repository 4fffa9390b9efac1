//! RDF term data model and the 64-bit `TermId` bit layout.
//!
//! `TermId` packs a 4-bit type tag and a 60-bit value into a single `u64`:
//!
//! ```text
//! bit63                                   bit0
//! [ tag:4 ][            value:60            ]
//! ```
//!
//! Tags `Uri`, `BlankNode`, `Literal` are *dictionary-allocated*: `value` is
//! a monotonically increasing per-type sequence from the allocator in
//! [`crate::sequence`]. Tags `Integer`, `Decimal`, `DateTime` are
//! *inline-encoded*: `value` carries the payload itself and never touches
//! the dictionary. Downstream consumers that persist `TermId`s must agree
//! on this tag numbering before interchanging data across stores.

use std::fmt;

/// Number of bits reserved for the type tag.
pub const TAG_BITS: u32 = 4;
/// Number of bits reserved for the value payload.
pub const VALUE_BITS: u32 = 60;
/// Largest sequence number a dictionary-allocated term may receive.
pub const MAX_SEQ: u64 = (1u64 << VALUE_BITS) - 1;
/// Safety margin added to a recovered counter to avoid ID reuse after a crash.
pub const SAFETY_MARGIN: u64 = 1000;

const VALUE_MASK: u64 = (1u64 << VALUE_BITS) - 1;

/// The dense, unambiguous set of `TermId` type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TermKind {
    Uri = 1,
    BlankNode = 2,
    Literal = 3,
    Integer = 4,
    Decimal = 5,
    DateTime = 6,
}

impl TermKind {
    const VALUES: [TermKind; 6] = [
        TermKind::Uri,
        TermKind::BlankNode,
        TermKind::Literal,
        TermKind::Integer,
        TermKind::Decimal,
        TermKind::DateTime,
    ];

    fn from_tag(tag: u8) -> Option<TermKind> {
        Self::VALUES.into_iter().find(|k| *k as u8 == tag)
    }

    /// Dictionary-allocated kinds are the three that go through `str2id`/`id2str`.
    pub fn is_dictionary_allocated(self) -> bool {
        matches!(self, TermKind::Uri | TermKind::BlankNode | TermKind::Literal)
    }

    /// Inline-encoded kinds carry their payload directly in the 60-bit value.
    pub fn is_inline(self) -> bool {
        !self.is_dictionary_allocated()
    }
}

/// A 64-bit identifier for an RDF term. See module docs for the bit layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u64);

impl TermId {
    /// Pack a tag and a value into a `TermId`. `value` must fit in 60 bits;
    /// callers within this crate maintain that invariant (see
    /// [`crate::codec`] and [`crate::sequence`]), so this is a
    /// `debug_assert!` rather than a fallible constructor.
    pub fn from_parts(kind: TermKind, value: u64) -> TermId {
        debug_assert!(value <= VALUE_MASK, "TermId value overflows 60 bits");
        TermId(((kind as u64) << VALUE_BITS) | (value & VALUE_MASK))
    }

    /// Reconstruct a `TermId` from its raw bits, as stored in `id2str` keys
    /// or triple permutation keys. Returns `None` if the tag is not one of
    /// the six dense values.
    pub fn from_raw(bits: u64) -> Option<TermId> {
        let tag = (bits >> VALUE_BITS) as u8;
        TermKind::from_tag(tag)?;
        Some(TermId(bits))
    }

    /// The raw 64-bit representation, as written to `id2str` keys and triple
    /// permutation keys.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// The type tag.
    pub fn kind(self) -> TermKind {
        let tag = (self.0 >> VALUE_BITS) as u8;
        TermKind::from_tag(tag).expect("TermId constructed with a dense tag")
    }

    /// The 60-bit payload: a dictionary sequence or an inline-encoded value.
    pub fn value(self) -> u64 {
        self.0 & VALUE_MASK
    }

    /// True iff this ID's payload is the literal value itself (no dictionary
    /// lookup required to decode it).
    pub fn is_inline_encoded(self) -> bool {
        self.kind().is_inline()
    }

    /// Big-endian bytes, as used in every on-disk permutation-index key.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`TermId::to_be_bytes`].
    pub fn from_be_bytes(bytes: [u8; 8]) -> Option<TermId> {
        TermId::from_raw(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermId")
            .field("kind", &self.kind())
            .field("value", &self.value())
            .finish()
    }
}

/// The lexical form of a literal's language/datatype annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralForm {
    /// No datatype or language annotation (`xsd:string` by RDF 1.1 rules).
    Plain,
    /// `^^<datatype-iri>`.
    Typed(String),
    /// `@lang` (a BCP-47 tag).
    Lang(String),
}

/// An RDF literal: a lexical form plus its annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub lexical: String,
    pub form: LiteralForm,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Literal {
        Literal { lexical: lexical.into(), form: LiteralForm::Plain }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Literal {
        Literal { lexical: lexical.into(), form: LiteralForm::Typed(datatype.into()) }
    }

    pub fn lang(lexical: impl Into<String>, tag: impl Into<String>) -> Literal {
        Literal { lexical: lexical.into(), form: LiteralForm::Lang(tag.into()) }
    }
}

/// The three user-visible shapes an RDF term can take.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
}

impl Term {
    pub fn iri(s: impl Into<String>) -> Term {
        Term::Iri(s.into())
    }

    pub fn blank(s: impl Into<String>) -> Term {
        Term::BlankNode(s.into())
    }

    /// The `TermKind` a dictionary-allocated encoding of this term would
    /// carry. Literals that are inline-encodable use [`crate::codec`]
    /// instead and never reach this path.
    pub fn dictionary_kind(&self) -> TermKind {
        match self {
            Term::Iri(_) => TermKind::Uri,
            Term::BlankNode(_) => TermKind::BlankNode,
            Term::Literal(_) => TermKind::Literal,
        }
    }
}
