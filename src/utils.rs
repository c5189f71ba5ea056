/// Escape control and non-ASCII characters so client-supplied text can be
/// written to the log safely.
pub fn safe_log_string(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\0' => result.push_str("\\0"),
            '\r' => result.push_str("\\r"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push('\t'),
            '\x01'..='\x1f' | '\x7f' => {
                result.push_str(&format!("\\x{:02x}", c as u32));
            }
            _ if c.is_ascii() => result.push(c),
            _ => result.push_str(&format!("\\u{{{:x}}}", c as u32)),
        }
    }
    result
}

/// The address between the first `<` and the next `>`, trimmed. Empty when
/// the brackets are missing or out of order.
pub fn extract_mailbox(arg: &str) -> &str {
    let Some(start) = arg.find('<') else {
        return "";
    };
    let rest = &arg[start + 1..];
    match rest.find('>') {
        Some(end) => rest[..end].trim(),
        None => "",
    }
}

/// Value of a `SIZE=` parameter following the path on a MAIL command.
pub fn declared_size(arg: &str) -> Option<usize> {
    let params = &arg[arg.find('>')? + 1..];
    params.split_whitespace().find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.eq_ignore_ascii_case("size") {
            value.parse().ok()
        } else {
            None
        }
    })
}

/// Whether the domain part of `address` is `domain` or one of its
/// subdomains, ignoring case.
pub fn domain_matches(address: &str, domain: &str) -> bool {
    let Some((_, host)) = address.rsplit_once('@') else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_log_string() {
        assert_eq!(safe_log_string("MAIL FROM:<a@b.com>"), "MAIL FROM:<a@b.com>");
        assert_eq!(safe_log_string("a\0b\x1bc\r\n"), "a\\0b\\x1bc\\r\\n");
        assert_eq!(safe_log_string("é"), "\\u{e9}");
    }

    #[test]
    fn test_extract_mailbox() {
        assert_eq!(extract_mailbox(" FROM:<a@b.com>"), "a@b.com");
        assert_eq!(extract_mailbox(" TO:< c@d.test >"), "c@d.test");
        assert_eq!(extract_mailbox(" FROM:<a@b.com> SIZE=100"), "a@b.com");
        assert_eq!(extract_mailbox(" FROM:<>"), "");
        assert_eq!(extract_mailbox(" FROM:a@b.com"), "");
        assert_eq!(extract_mailbox(" FROM:<a@b.com"), "");
        assert_eq!(extract_mailbox(" FROM:>a@b.com<"), "");
    }

    #[test]
    fn test_declared_size() {
        assert_eq!(declared_size(" FROM:<a@b.com> SIZE=1024"), Some(1024));
        assert_eq!(declared_size(" FROM:<a@b.com> BODY=8BITMIME size=77"), Some(77));
        assert_eq!(declared_size(" FROM:<a@b.com>"), None);
        assert_eq!(declared_size(" FROM:<a@b.com> SIZE=lots"), None);
        assert_eq!(declared_size(" FROM:a@b.com SIZE=5"), None);
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("user@example.com", "example.com"));
        assert!(domain_matches("user@Example.COM", "example.com"));
        assert!(domain_matches("user@mail.example.com", "EXAMPLE.com"));
        assert!(!domain_matches("user@evilexample.com", "example.com"));
        assert!(!domain_matches("user@notmydomain.test", "example.com"));
        assert!(!domain_matches("example.com", "example.com"));
        assert!(!domain_matches("user@example.com", ""));
    }
}
