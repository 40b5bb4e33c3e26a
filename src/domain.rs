//! Registrable-domain extraction.
//!
//! `https://news.bbc.co.uk/a/b` → `bbc.co.uk`. Matching uses the Public Suffix List
//! compiled into the `psl` crate, so no network access or state is involved and the
//! functions are safe to call from any number of threads.

use url::{Host, Url};

/// Registrable domain (`label.public-suffix`) of `url`, or `None`.
///
/// `None` input maps to `None`. See [`extract_domain_str`].
#[must_use]
pub fn extract_domain(url: Option<&str>) -> Option<String> {
    url.and_then(extract_domain_str)
}

/// Registrable domain of a URL string, or `None` when it cannot be resolved.
///
/// Unresolvable means any of: the string does not parse as a URL (a missing scheme is
/// tolerated), the host is an IP address, the host is itself a public suffix, or its
/// suffix is not on the Public Suffix List.
#[must_use]
pub fn extract_domain_str(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = parse_lenient(trimmed)?;
    let host = match parsed.host()? {
        Host::Domain(name) => name.trim_end_matches('.').to_ascii_lowercase(),
        Host::Ipv4(_) | Host::Ipv6(_) => return None,
    };
    if host.is_empty() {
        return None;
    }

    let domain = psl::domain(host.as_bytes())?;
    if !domain.suffix().is_known() {
        return None;
    }
    std::str::from_utf8(domain.as_bytes()).ok().map(str::to_owned)
}

fn parse_lenient(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => Some(parsed),
        // `example.com:8080/x` parses with `example.com` as the scheme.
        Ok(_) if !raw.contains("://") => Url::parse(&format!("http://{raw}")).ok(),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{raw}")).ok()
        }
        Err(_) => None,
    }
    .filter(Url::has_host)
}
