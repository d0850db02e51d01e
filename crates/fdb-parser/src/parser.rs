use std::collections::BTreeSet;
use std::net::IpAddr;

use fdb_core::filter::{RuleParser, StructuredFilter};
use fdb_core::types::{PartyMask, RequestType, RuleFlags, SchemeMask};

/// Why a line did not produce a network filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty line")]
    Empty,
    #[error("Comment line")]
    Comment,
    #[error("Not a network filter (cosmetic or scriptlet rule)")]
    UnsupportedKind,
    #[error("$badfilter rules are not supported")]
    Badfilter,
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Options exclude every {0}")]
    EmptyMask(&'static str),
    #[error("Invalid domain in $domain option: {0}")]
    InvalidDomain(String),
    #[error("Empty $domain option")]
    EmptyDomainOption,
    #[error("Regular expression patterns are not supported")]
    RegexPattern,
    #[error("Empty pattern")]
    EmptyPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorType {
    #[default]
    None,
    Left,
    Hostname,
}

/// A parsed ABP/uBO network filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    pub original_rule: String,
    pub category_id: i16,
    pub is_exception: bool,
    pub flags: RuleFlags,
    /// Host named by a `||` anchor or a hosts-file line
    pub host: Option<String>,
    /// Remaining URL pattern; `None` for pure host rules
    pub pattern: Option<String>,
    pub anchor_type: AnchorType,
    pub type_mask: RequestType,
    pub party_mask: PartyMask,
    pub scheme_mask: SchemeMask,
    pub applicable_domains: BTreeSet<String>,
    pub excluded_domains: BTreeSet<String>,
    pub redirect: Option<String>,
}

impl StructuredFilter for UrlFilter {
    fn is_exception(&self) -> bool {
        self.is_exception
    }

    fn applicable_domains(&self) -> &BTreeSet<String> {
        &self.applicable_domains
    }
}

/// Parser for ABP/uBO network filter syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbpRuleParser;

impl RuleParser for AbpRuleParser {
    type Filter = UrlFilter;
    type Error = ParseError;

    fn parse(&self, raw_line: &str, category_id: i16) -> Result<UrlFilter, ParseError> {
        parse_rule(raw_line, category_id)
    }
}

/// Parse one line of a filter list into a network filter.
pub fn parse_rule(raw_line: &str, category_id: i16) -> Result<UrlFilter, ParseError> {
    let original = raw_line.trim();
    if original.is_empty() {
        return Err(ParseError::Empty);
    }
    if original.starts_with('!') || original.starts_with('[') {
        return Err(ParseError::Comment);
    }
    if is_cosmetic_rule(original) {
        return Err(ParseError::UnsupportedKind);
    }
    if original.starts_with('#') {
        return Err(ParseError::Comment);
    }

    let mut line = original;
    let mut is_exception = false;
    if let Some(rest) = line.strip_prefix("@@") {
        is_exception = true;
        line = rest.trim_start();
    }

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => parse_options(options_text)?,
        None => ParsedOptions::default(),
    };

    let pattern_str = pattern_part.trim();

    let parsed = if let Some(host) = parse_host_anchor_rule(pattern_str) {
        ParsedPattern {
            host: Some(host),
            pattern: None,
            anchor_type: AnchorType::Hostname,
            flags: RuleFlags::HAS_HOST_ANCHOR,
        }
    } else if let Some(host) = parse_hosts_file_domain(pattern_str) {
        ParsedPattern {
            host: Some(host),
            pattern: None,
            anchor_type: AnchorType::Hostname,
            flags: RuleFlags::HAS_HOST_ANCHOR,
        }
    } else {
        parse_pattern_rule(pattern_str)?
    };

    let mut flags = options.flags | parsed.flags;
    if options.redirect.is_some() && !is_exception {
        flags |= RuleFlags::FROM_REDIRECT_EQ;
    }

    let mut applicable_domains = options.include_domains;
    if let Some(host) = &parsed.host {
        applicable_domains.insert(host.clone());
    }

    Ok(UrlFilter {
        original_rule: original.to_string(),
        category_id,
        is_exception,
        flags,
        host: parsed.host,
        pattern: parsed.pattern,
        anchor_type: parsed.anchor_type,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        scheme_mask: options.scheme_mask,
        applicable_domains,
        excluded_domains: options.exclude_domains,
        redirect: options.redirect,
    })
}

fn is_cosmetic_rule(line: &str) -> bool {
    line.contains("##") || line.contains("#@#") || line.contains("#?#") || line.contains("#$#")
}

struct ParsedOptions {
    flags: RuleFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    scheme_mask: SchemeMask,
    include_domains: BTreeSet<String>,
    exclude_domains: BTreeSet<String>,
    redirect: Option<String>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            type_mask: RequestType::empty(),
            party_mask: PartyMask::empty(),
            scheme_mask: SchemeMask::empty(),
            include_domains: BTreeSet::new(),
            exclude_domains: BTreeSet::new(),
            redirect: None,
        }
    }
}

fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, ParseError> {
    let mut options = ParsedOptions::default();
    let mut type_include = 0u32;
    let mut type_exclude = 0u32;
    let mut party_include = 0u32;
    let mut party_exclude = 0u32;
    let mut scheme_include = 0u32;
    let mut scheme_exclude = 0u32;

    for raw in text.trim().split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if raw_lower == "important" {
            options.flags |= RuleFlags::IMPORTANT;
            continue;
        }

        if raw_lower == "match-case" || raw_lower == "match_case" {
            options.flags |= RuleFlags::MATCH_CASE;
            continue;
        }

        if raw_lower == "badfilter" {
            return Err(ParseError::Badfilter);
        }

        if let Some(domain_value) = raw_lower.strip_prefix("domain=") {
            parse_domain_option(domain_value, &mut options)?;
            continue;
        }

        let redirect_prefix = ["redirect=", "redirect-rule="]
            .into_iter()
            .find(|prefix| raw_lower.starts_with(prefix));
        if let Some(prefix) = redirect_prefix {
            // Resource names are case-sensitive; only the option name is folded.
            let redirect_value = &raw[prefix.len()..];
            if !redirect_value.is_empty() {
                options.redirect = Some(redirect_value.to_string());
            }
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        let (include, exclude, mask) = if let Some(mask) = request_type_mask(name) {
            (&mut type_include, &mut type_exclude, mask)
        } else if let Some(mask) = party_mask(name) {
            (&mut party_include, &mut party_exclude, mask)
        } else if let Some(mask) = scheme_mask(name) {
            (&mut scheme_include, &mut scheme_exclude, mask)
        } else {
            return Err(ParseError::UnknownOption(raw.to_string()));
        };

        if negated {
            *exclude |= mask;
        } else {
            *include |= mask;
        }
    }

    let type_bits = finalize_mask(type_include, type_exclude, RequestType::ALL.bits())
        .ok_or(ParseError::EmptyMask("request type"))?;
    let party_bits = finalize_mask(party_include, party_exclude, PartyMask::ALL.bits() as u32)
        .ok_or(ParseError::EmptyMask("party"))?;
    let scheme_bits = finalize_mask(scheme_include, scheme_exclude, SchemeMask::ALL.bits() as u32)
        .ok_or(ParseError::EmptyMask("scheme"))?;

    options.type_mask = RequestType::from_bits_truncate(type_bits);
    options.party_mask = PartyMask::from_bits_truncate(party_bits as u8);
    options.scheme_mask = SchemeMask::from_bits_truncate(scheme_bits as u8);

    Ok(options)
}

fn parse_domain_option(value: &str, options: &mut ParsedOptions) -> Result<(), ParseError> {
    let mut seen = false;

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)
            .ok_or_else(|| ParseError::InvalidDomain(domain_raw.to_string()))?;
        seen = true;

        if is_exclude {
            options.exclude_domains.insert(domain);
        } else {
            options.include_domains.insert(domain);
        }
    }

    if seen {
        Ok(())
    } else {
        Err(ParseError::EmptyDomainOption)
    }
}

/// Combine include/exclude bits into the final mask. An empty result means
/// "every value"; `None` means the options excluded everything.
fn finalize_mask(include: u32, exclude: u32, all: u32) -> Option<u32> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn request_type_mask(name: &str) -> Option<u32> {
    let mask = match name {
        "script" => RequestType::SCRIPT,
        "image" => RequestType::IMAGE,
        "stylesheet" | "css" => RequestType::STYLESHEET,
        "object" => RequestType::OBJECT,
        "subdocument" | "frame" => RequestType::SUBDOCUMENT,
        "document" | "main_frame" | "doc" => RequestType::MAIN_FRAME,
        "xmlhttprequest" | "xhr" => RequestType::XMLHTTPREQUEST,
        "media" => RequestType::MEDIA,
        "font" => RequestType::FONT,
        "ping" => RequestType::PING,
        "websocket" => RequestType::WEBSOCKET,
        "beacon" => RequestType::BEACON,
        "fetch" => RequestType::FETCH,
        "csp" | "csp_report" => RequestType::CSP_REPORT,
        "other" => RequestType::OTHER,
        _ => return None,
    };
    Some(mask.bits())
}

fn party_mask(name: &str) -> Option<u32> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY.bits() as u32),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY.bits() as u32),
        _ => None,
    }
}

fn scheme_mask(name: &str) -> Option<u32> {
    let mask = match name {
        "http" => SchemeMask::HTTP,
        "https" => SchemeMask::HTTPS,
        "ws" => SchemeMask::WS,
        "wss" => SchemeMask::WSS,
        "data" => SchemeMask::DATA,
        "ftp" => SchemeMask::FTP,
        _ => return None,
    };
    Some(mask.bits() as u32)
}

fn parse_host_anchor_rule(line: &str) -> Option<String> {
    let mut rest = line.strip_prefix("||")?;
    if let Some(stripped) = rest.strip_prefix('.') {
        rest = stripped;
    }

    let mut end = rest.len();
    for (i, ch) in rest.char_indices() {
        if ch == '^' || ch == '|' {
            end = i;
            break;
        }
        if ch == '/' || ch == '?' || ch == '#' || ch == ':' || ch == '*' {
            return None;
        }
    }

    // Only a separator (and optional right anchor) may follow the host.
    let tail = rest[end..].trim_start_matches('^');
    if !tail.is_empty() && tail != "|" {
        return None;
    }

    normalize_domain(&rest[..end])
}

fn parse_hosts_file_domain(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_ok() {
        return normalize_domain(second);
    }

    None
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

struct ParsedPattern {
    host: Option<String>,
    pattern: Option<String>,
    anchor_type: AnchorType,
    flags: RuleFlags,
}

fn parse_pattern_rule(line: &str) -> Result<ParsedPattern, ParseError> {
    let (anchor_type, rest) = if let Some(rest) = line.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = line.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, line)
    };

    let mut flags = match anchor_type {
        AnchorType::Hostname => RuleFlags::HAS_HOST_ANCHOR,
        AnchorType::Left => RuleFlags::HAS_LEFT_ANCHOR,
        AnchorType::None => RuleFlags::empty(),
    };

    let trimmed = rest.trim_end_matches('|');
    if trimmed.len() != rest.len() {
        flags |= RuleFlags::HAS_RIGHT_ANCHOR;
    }
    let rest = trimmed;

    if rest.is_empty() || rest == "*" {
        return Err(ParseError::EmptyPattern);
    }
    if rest.starts_with('/') && !rest.contains('.') {
        return Err(ParseError::RegexPattern);
    }

    Ok(ParsedPattern {
        host: extract_pattern_host(rest, anchor_type),
        pattern: Some(rest.to_string()),
        anchor_type,
        flags,
    })
}

fn extract_pattern_host(pattern: &str, anchor_type: AnchorType) -> Option<String> {
    if anchor_type != AnchorType::Hostname {
        return None;
    }

    let mut end = pattern.len();
    for (i, ch) in pattern.char_indices() {
        if ch == '/' || ch == '^' || ch == '*' || ch == '?' || ch == '#' || ch == ':' {
            end = i;
            break;
        }
    }

    // A wildcard inside the host leaves no concrete domain to anchor to.
    if pattern[end..].starts_with('*') {
        return None;
    }

    normalize_domain(&pattern[..end])
}
