use crate::error::Error;

/// Canonical form of a hostname used as the pin key.
///
/// Lower-cases, drops a trailing dot, a `:port` suffix and IPv6 brackets.
pub fn normalize_hostname(input: &str) -> Result<String, Error> {
    let trimmed = input.trim();
    let host = if let Some(rest) = trimmed.strip_prefix('[') {
        // [v6] or [v6]:port
        match rest.split_once(']') {
            Some((inner, tail)) if tail.is_empty() || is_port_suffix(tail) => inner,
            _ => return Err(Error::InvalidHostname(input.to_string())),
        }
    } else {
        match trimmed.rsplit_once(':') {
            // More than one colon without brackets is a bare IPv6 address.
            Some((host, port)) if !host.contains(':') => {
                if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::InvalidHostname(input.to_string()));
                }
                host
            }
            _ => trimmed,
        }
    };

    let host = host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase();
    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(Error::InvalidHostname(input.to_string()));
    }
    Ok(host)
}

fn is_port_suffix(tail: &str) -> bool {
    tail.strip_prefix(':')
        .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}
