//! Recipient-shape and peer-url validation. Mirrors `internal/utils`'s digit/length checks and
//! `internal/httpserver/federation.go`'s blacklist gate (`IsValidDomainOrIP` in the original was
//! truncated in the retrieved source; this reconstructs exact-match domain blocking and
//! prefix-match CIDR blocking for IPv4 literals from its call site's contract).

use std::net::Ipv4Addr;

use coldwire_types::constants::{FEDERATED_RECIPIENT_MAX_LEN, FEDERATED_RECIPIENT_MIN_LEN, USER_ID_LEN};

/// A local recipient: exactly `USER_ID_LEN` ASCII digits.
pub fn is_local_recipient(recipient: &str) -> bool {
    recipient.len() == USER_ID_LEN && recipient.bytes().all(|b| b.is_ascii_digit())
}

/// A federated recipient: `local-part@peer-url`, length in
/// `(FEDERATED_RECIPIENT_MIN_LEN, FEDERATED_RECIPIENT_MAX_LEN]`, containing exactly one `@`.
pub fn split_federated_recipient(recipient: &str) -> Option<(&str, &str)> {
    if recipient.len() <= FEDERATED_RECIPIENT_MIN_LEN || recipient.len() > FEDERATED_RECIPIENT_MAX_LEN {
        return None;
    }
    let mut parts = recipient.splitn(2, '@');
    let local_part = parts.next()?;
    let peer_url = parts.next()?;
    if peer_url.contains('@') {
        return None;
    }
    if local_part.is_empty() || peer_url.is_empty() {
        return None;
    }
    Some((local_part, peer_url))
}

pub fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Rejects a peer url if its host matches a blacklisted domain suffix or falls inside a
/// blacklisted IPv4 CIDR range.
pub fn is_valid_domain_or_ip(url: &str, blacklisted_ips: &[String], blacklisted_domains: &[String]) -> bool {
    let host = url.split(':').next().unwrap_or(url);

    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        for cidr in blacklisted_ips {
            if ipv4_in_cidr(addr, cidr) {
                return false;
            }
        }
        return true;
    }

    let host_lower = host.to_ascii_lowercase();
    for domain in blacklisted_domains {
        let domain_lower = domain.to_ascii_lowercase();
        if host_lower == domain_lower || host_lower.ends_with(&format!(".{domain_lower}")) {
            return false;
        }
    }
    true
}

fn ipv4_in_cidr(addr: Ipv4Addr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return cidr.parse::<Ipv4Addr>().map(|n| n == addr).unwrap_or(false);
    };
    let Ok(network) = network.parse::<Ipv4Addr>() else {
        return false;
    };
    let Ok(prefix_len) = prefix_len.parse::<u32>() else {
        return false;
    };
    if prefix_len > 32 {
        return false;
    }

    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    };
    (u32::from(addr) & mask) == (u32::from(network) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_federated_recipient() {
        let (local, peer) = split_federated_recipient("1234567890123456@relay.example").unwrap();
        assert_eq!(local, "1234567890123456");
        assert_eq!(peer, "relay.example");
    }

    #[test]
    fn rejects_recipient_with_no_at_sign() {
        assert!(split_federated_recipient("plainstring").is_none());
    }

    #[test]
    fn rejects_recipient_at_or_under_the_minimum_length() {
        assert!(split_federated_recipient("1@x.co").is_none());
    }

    #[test]
    fn blocks_blacklisted_domain_suffix() {
        let blacklisted = vec!["evil.example".to_string()];
        assert!(!is_valid_domain_or_ip("sub.evil.example", &[], &blacklisted));
        assert!(is_valid_domain_or_ip("good.example", &[], &blacklisted));
    }

    #[test]
    fn blocks_blacklisted_cidr() {
        let blacklisted = vec!["10.0.0.0/8".to_string()];
        assert!(!is_valid_domain_or_ip("10.1.2.3", &blacklisted, &[]));
        assert!(is_valid_domain_or_ip("8.8.8.8", &blacklisted, &[]));
    }
}
