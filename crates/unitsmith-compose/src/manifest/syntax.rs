//! Short-syntax parsers for Compose values, built on `nom`.
//!
//! Covers port mappings, volume strings, Go-style durations, byte sizes,
//! and shell-style word splitting for string commands.

use std::fmt;
use std::time::Duration;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until, take_while, take_while1},
    character::complete::{alpha1, anychar, char, digit1, multispace0},
    combinator::{all_consuming, opt, recognize},
    multi::{fold_many1, many0, many1, separated_list1},
    sequence::{delimited, preceded, terminated},
};
use unitsmith_common::error::{Result, UnitsmithError};

/// A published port, `[host-ip:][host-port:]container-port[/protocol]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Host interface to bind; IPv6 addresses are stored without brackets.
    pub host_ip: Option<String>,
    /// Host port or range.
    pub published: Option<String>,
    /// Container port or range.
    pub target: String,
    /// `tcp`, `udp`, or `sctp`.
    pub protocol: Option<String>,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = &self.host_ip {
            if ip.contains(':') {
                write!(f, "[{ip}]:")?;
            } else {
                write!(f, "{ip}:")?;
            }
            // An IP without a host port still needs the empty slot.
            if self.published.is_none() {
                f.write_str(":")?;
            }
        }
        if let Some(published) = &self.published {
            write!(f, "{published}:")?;
        }
        f.write_str(&self.target)?;
        if let Some(proto) = &self.protocol {
            write!(f, "/{proto}")?;
        }
        Ok(())
    }
}

/// A volume short-syntax entry split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeShort {
    /// Host path or volume name; `None` for anonymous volumes.
    pub source: Option<String>,
    /// Mount point inside the container.
    pub target: String,
    /// Mode flags (`ro`, `rw,z`, ...).
    pub mode: Option<String>,
}

fn port_range(input: &str) -> IResult<&str, &str> {
    recognize((digit1, opt((char('-'), digit1)))).parse(input)
}

fn host_ip(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('['), take_until("]"), char(']')),
        take_while1(|c: char| c != ':' && c != '/'),
    ))
    .parse(input)
}

type PortParts<'a> = (Option<&'a str>, Option<&'a str>, &'a str);

fn port_with_ip(input: &str) -> IResult<&str, PortParts<'_>> {
    let (input, (ip, _, published, _, target)) =
        (host_ip, char(':'), opt(port_range), char(':'), port_range).parse(input)?;
    Ok((input, (Some(ip), published, target)))
}

fn port_with_host(input: &str) -> IResult<&str, PortParts<'_>> {
    let (input, (published, _, target)) = (port_range, char(':'), port_range).parse(input)?;
    Ok((input, (None, Some(published), target)))
}

fn port_bare(input: &str) -> IResult<&str, PortParts<'_>> {
    let (input, target) = port_range(input)?;
    Ok((input, (None, None, target)))
}

/// Parses a short-syntax port mapping.
///
/// # Errors
///
/// Returns an error if the value does not match the port grammar.
pub fn parse_port(input: &str) -> Result<PortSpec> {
    let mut parser = all_consuming((
        alt((port_with_ip, port_with_host, port_bare)),
        opt(preceded(char('/'), alpha1)),
    ));
    let (_, ((host_ip, published, target), protocol)) = parser
        .parse(input.trim())
        .map_err(|e| UnitsmithError::manifest(format!("invalid port \"{input}\": {e}")))?;
    Ok(PortSpec {
        host_ip: host_ip.map(str::to_owned),
        published: published.map(str::to_owned),
        target: target.to_owned(),
        protocol: protocol.map(str::to_owned),
    })
}

/// Splits a short-syntax volume entry into source, target, and mode.
///
/// # Errors
///
/// Returns an error if the entry is empty or has more than three parts.
pub fn parse_volume(input: &str) -> Result<VolumeShort> {
    let segment = take_while1(|c: char| c != ':');
    let (_, parts) = all_consuming(separated_list1(char(':'), segment))
        .parse(input.trim())
        .map_err(|e: nom::Err<nom::error::Error<&str>>| {
            UnitsmithError::manifest(format!("invalid volume \"{input}\": {e}"))
        })?;
    match parts.as_slice() {
        [target] => Ok(VolumeShort {
            source: None,
            target: (*target).to_owned(),
            mode: None,
        }),
        [source, target] => Ok(VolumeShort {
            source: Some((*source).to_owned()),
            target: (*target).to_owned(),
            mode: None,
        }),
        [source, target, mode] => Ok(VolumeShort {
            source: Some((*source).to_owned()),
            target: (*target).to_owned(),
            mode: Some((*mode).to_owned()),
        }),
        _ => Err(UnitsmithError::manifest(format!(
            "invalid volume \"{input}\": too many ':'-separated parts"
        ))),
    }
}

fn decimal(input: &str) -> IResult<&str, &str> {
    recognize((digit1, opt((char('.'), digit1)))).parse(input)
}

fn duration_unit(input: &str) -> IResult<&str, u128> {
    alt((
        tag("ns").map(|_| 1),
        tag("us").map(|_| 1_000),
        tag("\u{b5}s").map(|_| 1_000),
        tag("ms").map(|_| 1_000_000),
        tag("s").map(|_| 1_000_000_000),
        tag("m").map(|_| 60_000_000_000),
        tag("h").map(|_| 3_600_000_000_000),
    ))
    .parse(input)
}

/// Scales a decimal literal by `unit` nanoseconds without going through floats.
fn scaled_nanos(value: &str, unit: u128) -> Option<u128> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let whole: u128 = whole.parse().ok()?;
    let mut nanos = whole.checked_mul(unit)?;
    if !frac.is_empty() {
        let digits: u128 = frac.parse().ok()?;
        let denom = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;
        nanos = nanos.checked_add(digits.checked_mul(unit)? / denom)?;
    }
    Some(nanos)
}

/// Parses a Go-style duration such as `1m30s` or `500ms`.
///
/// # Errors
///
/// Returns an error if the value is not a valid duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    let component = (decimal, duration_unit);
    let (_, parts) = all_consuming(many1(component))
        .parse(trimmed)
        .map_err(|e| UnitsmithError::manifest(format!("invalid duration \"{input}\": {e}")))?;
    let mut nanos = 0u128;
    for (value, unit) in parts {
        nanos = scaled_nanos(value, unit)
            .and_then(|n| nanos.checked_add(n))
            .ok_or_else(|| UnitsmithError::manifest(format!("invalid duration \"{input}\"")))?;
    }
    let secs = u64::try_from(nanos / 1_000_000_000)
        .map_err(|_| UnitsmithError::manifest(format!("duration out of range: \"{input}\"")))?;
    let subsec = u32::try_from(nanos % 1_000_000_000).unwrap_or_default();
    Ok(Duration::new(secs, subsec))
}

/// Formats a duration the way Go prints one (`1m30s`, `500ms`, `1h0m0s`).
#[must_use]
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_owned();
    }
    let nanos = d.as_nanos();
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}us", trim_fraction(nanos, 1_000));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", trim_fraction(nanos, 1_000_000));
    }
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = trim_fraction(
        u128::from(total_secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos()),
        1_000_000_000,
    );
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn trim_fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

fn size_unit(input: &str) -> IResult<&str, u64> {
    let (input, scale) = opt(alt((
        tag_no_case("k").map(|_| 1u64 << 10),
        tag_no_case("m").map(|_| 1u64 << 20),
        tag_no_case("g").map(|_| 1u64 << 30),
        tag_no_case("t").map(|_| 1u64 << 40),
    )))
    .parse(input)?;
    let (input, _) = opt(tag_no_case("b")).parse(input)?;
    Ok((input, scale.unwrap_or(1)))
}

/// Parses a byte size such as `512m`, `2g`, `64kb`, or `1024`.
///
/// # Errors
///
/// Returns an error if the value is not a valid size.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_byte_size(input: &str) -> Result<u64> {
    let (_, (value, scale)) = all_consuming((decimal, size_unit))
        .parse(input.trim())
        .map_err(|e| UnitsmithError::manifest(format!("invalid byte size \"{input}\": {e}")))?;
    let value: f64 = value
        .parse()
        .map_err(|_| UnitsmithError::manifest(format!("invalid byte size \"{input}\"")))?;
    Ok((value * scale as f64).round() as u64)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    delimited(char('\''), take_while(|c: char| c != '\''), char('\''))
        .map(str::to_owned)
        .parse(input)
}

/// Double-quoted run; backslash escapes only `"`, `\`, `$`, and backtick.
fn double_quoted(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"').parse(input)?;
    let mut out = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => return Ok((&input[idx + 1..], out)),
            Some((_, '\\')) => match chars.next() {
                Some((_, c @ ('"' | '\\' | '$' | '`'))) => out.push(c),
                Some((_, c)) => {
                    out.push('\\');
                    out.push(c);
                }
                None => break,
            },
            Some((_, c)) => out.push(c),
            None => break,
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn escaped_char(input: &str) -> IResult<&str, String> {
    preceded(char('\\'), anychar).map(String::from).parse(input)
}

fn bare(input: &str) -> IResult<&str, String> {
    take_while1(|c: char| !c.is_whitespace() && !matches!(c, '\'' | '"' | '\\'))
        .map(str::to_owned)
        .parse(input)
}

fn word(input: &str) -> IResult<&str, String> {
    fold_many1(
        alt((single_quoted, double_quoted, escaped_char, bare)),
        String::new,
        |mut acc: String, part: String| {
            acc.push_str(&part);
            acc
        },
    )
    .parse(input)
}

/// Splits a command string into words the way a POSIX shell would,
/// without expansion.
///
/// # Errors
///
/// Returns an error on unterminated quotes.
pub fn parse_shell_words(input: &str) -> Result<Vec<String>> {
    let (_, words) = all_consuming(preceded(multispace0, many0(terminated(word, multispace0))))
        .parse(input)
        .map_err(|e| UnitsmithError::manifest(format!("invalid command \"{input}\": {e}")))?;
    Ok(words)
}

/// Quotes a word for a POSIX shell if it contains anything special.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
