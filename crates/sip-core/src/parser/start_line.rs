use std::str;

use nom::{
    bytes::complete::{tag_no_case, take_while1, take_while_m_n},
    character::complete::{space0, space1},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::types::method::is_token_byte;

/// Request-Line or Status-Line, borrowed from the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartLine<'a> {
    Request { method: &'a str, uri: &'a str },
    Status { code: u16, reason: &'a str },
}

fn sip_version(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag_no_case("SIP/2.0")(input)
}

fn utf8(bytes: &[u8]) -> Result<&str, str::Utf8Error> {
    str::from_utf8(bytes)
}

// Request-Line = Method SP Request-URI SP SIP-Version
fn request_line(input: &[u8]) -> IResult<&[u8], StartLine<'_>> {
    let (input, (method, _, uri, _)) = tuple((
        map_res(take_while1(is_token_byte), utf8),
        space1,
        map_res(take_while1(|b: u8| b != b' ' && b != b'\t'), utf8),
        space1,
    ))(input)?;
    let (input, _) = terminated(sip_version, space0)(input)?;
    Ok((input, StartLine::Request { method, uri }))
}

// Status-Line = SIP-Version SP Status-Code SP Reason-Phrase
fn status_line(input: &[u8]) -> IResult<&[u8], StartLine<'_>> {
    let (input, (_, _, code)) = tuple((
        sip_version,
        space1,
        map_res(
            map_res(take_while_m_n(3, 3, |b: u8| b.is_ascii_digit()), utf8),
            str::parse::<u16>,
        ),
    ))(input)?;
    let (input, reason) = opt(preceded(space1, map_res(rest, utf8)))(input)?;
    Ok((
        input,
        StartLine::Status {
            code,
            reason: reason.unwrap_or("").trim_end(),
        },
    ))
}

/// Parse a complete start line (without its line terminator)
pub(crate) fn parse_start_line(line: &[u8]) -> Option<StartLine<'_>> {
    let parsed = if line.len() >= 4 && line[..4].eq_ignore_ascii_case(b"SIP/") {
        all_consuming(status_line)(line)
    } else {
        all_consuming(request_line)(line)
    };
    parsed.ok().map(|(_, start)| start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line() {
        assert_eq!(
            parse_start_line(b"INVITE sip:bob@biloxi.com SIP/2.0"),
            Some(StartLine::Request {
                method: "INVITE",
                uri: "sip:bob@biloxi.com"
            })
        );
        assert!(parse_start_line(b"INVITE sip:bob@biloxi.com SIP/3.0").is_none());
        assert!(parse_start_line(b"INVITE  SIP/2.0").is_none());
        assert!(parse_start_line(b"INVITE sip:bob@biloxi.com").is_none());
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            parse_start_line(b"SIP/2.0 180 Ringing"),
            Some(StartLine::Status {
                code: 180,
                reason: "Ringing"
            })
        );
        assert_eq!(
            parse_start_line(b"SIP/2.0 200"),
            Some(StartLine::Status { code: 200, reason: "" })
        );
        assert_eq!(
            parse_start_line(b"SIP/2.0 481 Call/Transaction Does Not Exist"),
            Some(StartLine::Status {
                code: 481,
                reason: "Call/Transaction Does Not Exist"
            })
        );
        assert!(parse_start_line(b"SIP/2.0 20 OK").is_none());
        assert!(parse_start_line(b"SIP/2.0 2000 OK").is_none());
    }
}
