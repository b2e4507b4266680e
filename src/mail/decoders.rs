use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use mail_builder::MessageBuilder;

use crate::domain::email::Reply;

/// Decodes RFC 2047 encoded-words in a header value.
pub fn decode_mime_words(raw: &str) -> String {
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw.as_bytes());
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => raw.to_string(),
    }
}

/// `"Name <addr>"` yields `addr`; anything without angle brackets is returned as is.
pub fn extract_address(from_header: &str) -> &str {
    if let Some(start) = from_header.find('<') {
        let rest = &from_header[start + 1..];
        if let Some(end) = rest.find('>')
            && end > 0
        {
            return &rest[..end];
        }
    }
    from_header
}

/// Cuts `s` to `max_chars` characters, appending `...` when something was cut.
pub fn truncate_snippet(s: &str, max_chars: usize) -> String {
    let mut chars = s.char_indices();
    match chars.nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Folds a header value onto one line. CR and LF never reach the header block.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A bare `local@domain` with no whitespace or control characters.
fn checked_address<'a>(value: &'a str, role: &str) -> Result<&'a str> {
    let addr = extract_address(value).trim();
    let well_formed = addr
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !addr.chars().any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>');
    if well_formed {
        Ok(addr)
    } else {
        Err(anyhow!("refusing reply with malformed {role} address {value:?}"))
    }
}

/// RFC 822 text/plain message for a reply. An empty `from` leaves the header to the server.
pub fn build_reply_message(reply: &Reply) -> Result<Vec<u8>> {
    let to = checked_address(&reply.to, "recipient")?;
    let subject = single_line(&reply.subject);

    let mut builder = MessageBuilder::new()
        .to(to)
        .subject(subject.as_str())
        .text_body(reply.body.as_str());
    if !reply.from.is_empty() {
        builder = builder.from(checked_address(&reply.from, "sender")?);
    }
    builder
        .write_to_vec()
        .context("rendering reply message")
}

/// Base64url form of the reply as the Gmail send endpoint expects it in `raw`.
pub fn encode_reply_raw(reply: &Reply) -> Result<String> {
    Ok(general_purpose::URL_SAFE.encode(build_reply_message(reply)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::MailHeaderMap;

    #[test]
    fn extracts_bracketed_address() {
        assert_eq!(extract_address("Jane Doe <jane@example.com>"), "jane@example.com");
        assert_eq!(extract_address("jane@example.com"), "jane@example.com");
        assert_eq!(extract_address("\"A, B\" <ab@x.io> trailing"), "ab@x.io");
        assert_eq!(extract_address("broken <"), "broken <");
        assert_eq!(extract_address("<>"), "<>");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_snippet("short", 200), "short");
        let exact = "a".repeat(200);
        assert_eq!(truncate_snippet(&exact, 200), exact);
        let long = "é".repeat(201);
        let cut = truncate_snippet(&long, 200);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("é..."));
    }

    #[test]
    fn decodes_encoded_words() {
        assert_eq!(decode_mime_words("=?utf-8?B?Q2Fmw6k=?="), "Café");
        assert_eq!(decode_mime_words("plain subject"), "plain subject");
    }

    fn reply(to: &str, from: &str, subject: &str) -> Reply {
        Reply {
            thread_id: "t1".into(),
            to: to.into(),
            from: from.into(),
            subject: subject.into(),
            body: "Thanks, noted.".into(),
        }
    }

    #[test]
    fn reply_message_round_trips_through_base64url() {
        let raw =
            encode_reply_raw(&reply("jane@example.com", "bot@example.com", "Re: Café meeting"))
                .unwrap();
        assert!(!raw.contains('+') && !raw.contains('/'));

        let decoded = general_purpose::URL_SAFE.decode(raw).unwrap();
        let parsed = mailparse::parse_mail(&decoded).unwrap();
        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Re: Café meeting")
        );
        let to = parsed.headers.get_first_value("To").unwrap();
        assert!(to.contains("jane@example.com"), "{to}");
        let from = parsed.headers.get_first_value("From").unwrap();
        assert!(from.contains("bot@example.com"), "{from}");
        assert_eq!(parsed.get_body().unwrap().trim_end(), "Thanks, noted.");
    }

    #[test]
    fn empty_from_is_left_out() {
        let bytes = build_reply_message(&reply("a@b.c", "", "Re: hi")).unwrap();
        let parsed = mailparse::parse_mail(&bytes).unwrap();
        assert!(parsed.headers.get_first_value("From").is_none());
        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Re: hi")
        );
    }

    #[test]
    fn line_breaks_in_subject_cannot_add_headers() {
        let subject = decode_mime_words("=?utf-8?B?aGkNCkJjYzogdmljdGltQGV2aWwudGVzdA==?=");
        assert_eq!(subject, "hi\r\nBcc: victim@evil.test");

        let bytes =
            build_reply_message(&reply("a@b.c", "", &format!("Re: {subject}"))).unwrap();
        let parsed = mailparse::parse_mail(&bytes).unwrap();
        assert!(parsed.headers.get_first_value("Bcc").is_none());
        assert_eq!(
            parsed.headers.get_first_value("Subject").as_deref(),
            Some("Re: hi Bcc: victim@evil.test")
        );
    }

    #[test]
    fn malformed_addresses_are_refused() {
        let injected = "a@b.c\r\nBcc: victim@evil.test";
        assert!(build_reply_message(&reply(injected, "", "Re: hi")).is_err());
        assert!(build_reply_message(&reply("Unknown", "", "Re: hi")).is_err());
        assert!(build_reply_message(&reply("a@b.c", injected, "Re: hi")).is_err());

        // display names are reduced to the bare address
        let bytes =
            build_reply_message(&reply("Jane <jane@example.com>", "", "Re: hi")).unwrap();
        let parsed = mailparse::parse_mail(&bytes).unwrap();
        assert!(parsed.headers.get_first_value("To").unwrap().contains("jane@example.com"));
    }
}
