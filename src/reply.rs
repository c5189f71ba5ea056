//! SMTP replies

/// A reply sent to the client: a three-digit code and one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Multi-line reply, as used by EHLO. Every line but the last is sent
    /// with a `-` after the code.
    pub fn multiline(code: u16, lines: Vec<String>) -> Self {
        if lines.is_empty() {
            return Self::new(code, "");
        }
        Self { code, lines }
    }

    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    pub fn bad_sequence() -> Self {
        Self::new(503, "command out of sequence")
    }

    pub fn not_implemented() -> Self {
        Self::new(502, "command not implemented")
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    /// Wire form, CRLF terminated. Control characters in the text are sent
    /// as spaces so client-supplied text cannot end a reply line early.
    pub fn format(&self) -> String {
        let last = self.lines.len() - 1;
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            let text: String = line
                .chars()
                .map(|c| if c.is_control() { ' ' } else { c })
                .collect();
            out.push_str(&format!("{}{}{}\r\n", self.code, sep, text));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(Reply::ok().format(), "250 Ok\r\n");
        assert_eq!(
            Reply::new(221, "server closing connection").format(),
            "221 server closing connection\r\n"
        );
    }

    #[test]
    fn test_multiline_format() {
        let reply = Reply::multiline(
            250,
            vec![
                "mx.example.com Hello client".to_string(),
                "STARTTLS".to_string(),
                "SIZE 35882577".to_string(),
            ],
        );
        assert_eq!(
            reply.format(),
            "250-mx.example.com Hello client\r\n250-STARTTLS\r\n250 SIZE 35882577\r\n"
        );
    }

    #[test]
    fn test_control_characters_cannot_split_a_reply() {
        let reply = Reply::new(550, "bad recipient <x\r250 injected\n>");
        assert_eq!(reply.format(), "550 bad recipient <x 250 injected >\r\n");
    }

    #[test]
    fn test_empty_multiline_still_formats() {
        assert_eq!(Reply::multiline(250, Vec::new()).format(), "250 \r\n");
    }

    #[test]
    fn test_is_error() {
        assert!(Reply::bad_sequence().is_error());
        assert!(Reply::new(451, "error").is_error());
        assert!(!Reply::new(354, "go ahead").is_error());
        assert!(!Reply::ok().is_error());
    }
}
