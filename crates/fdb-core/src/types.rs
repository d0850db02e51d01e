//! Core type definitions for filterdb
//!
//! These types describe stored rule entries and the option masks carried by
//! parsed network filters.

use std::fmt;
use std::sync::Arc;

/// Domain key under which rules without any domain anchor are filed.
pub const GLOBAL_DOMAIN: &str = "global";

// =============================================================================
// Partitions
// =============================================================================

/// Which side of the store a rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Partition {
    /// Blocking rules
    Blacklist = 0,
    /// Exception rules (@@...)
    Whitelist = 1,
}

impl Partition {
    /// Map a parsed exception flag onto its partition.
    #[inline]
    pub const fn from_exception(is_exception: bool) -> Self {
        if is_exception {
            Self::Whitelist
        } else {
            Self::Blacklist
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blacklist => f.write_str("blacklist"),
            Self::Whitelist => f.write_str("whitelist"),
        }
    }
}

// =============================================================================
// Rule Entries
// =============================================================================

/// One stored rule, filed under a single domain key.
///
/// Equality, hashing and ordering cover all four fields, so a bucket holding
/// entries as a set absorbs re-ingestion of the same rule. The source text is
/// shared between the entries produced for each applicable domain of a rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleEntry {
    pub domain_key: String,
    pub category_id: i16,
    pub partition: Partition,
    pub source_text: Arc<str>,
}

impl RuleEntry {
    pub fn new(
        domain_key: impl Into<String>,
        category_id: i16,
        partition: Partition,
        source_text: Arc<str>,
    ) -> Self {
        Self {
            domain_key: domain_key.into(),
            category_id,
            partition,
            source_text,
        }
    }
}

// =============================================================================
// Rule Flags (bit flags describing rule behavior)
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// $important - ignores exception filters
        const IMPORTANT = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 2;
        /// Created by $redirect= (block part)
        const FROM_REDIRECT_EQ = 1 << 4;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 7;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 8;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 9;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask. An empty mask matches every type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;
        const CSP_REPORT = 1 << 12;
        const BEACON = 1 << 13;
        const FETCH = 1 << 14;
        const SPECULATIVE = 1 << 15;

        /// All request types
        const ALL = 0xFFFF;
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask. An empty mask matches both.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        const FIRST_PARTY = 1 << 0;
        const THIRD_PARTY = 1 << 1;
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Scheme Masks
// =============================================================================

bitflags::bitflags! {
    /// URL scheme mask. An empty mask matches every scheme.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchemeMask: u8 {
        const HTTP = 1 << 0;
        const HTTPS = 1 << 1;
        const WS = 1 << 2;
        const WSS = 1 << 3;
        const DATA = 1 << 4;
        const FTP = 1 << 5;
        const ALL = Self::HTTP.bits()
            | Self::HTTPS.bits()
            | Self::WS.bits()
            | Self::WSS.bits()
            | Self::DATA.bits()
            | Self::FTP.bits();
    }
}
