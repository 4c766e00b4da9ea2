use base64::Engine;
use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_while, take_while1},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map, opt, rest, value},
    error::{Error, ErrorKind},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::error::ProtocolError;
use super::types::*;

/// First line received by the client
pub fn mechanism_list(line: &[u8]) -> Result<MechanismList, ProtocolError> {
    let list = complete(line, mechanisms)?;
    if list.is_empty() {
        return Err(ProtocolError::EmptyMechanismList);
    }
    Ok(list)
}

/// First line received by the server
pub fn first_step(line: &[u8]) -> Result<ClientFrame, ProtocolError> {
    complete(line, first_step_frame)
}

/// Any line received by the client once the exchange has started
pub fn server_frame(line: &[u8]) -> Result<ServerFrame, ProtocolError> {
    complete(line, server_step_frame)
}

/// Any line received by the server once the exchange has started
pub fn client_frame(line: &[u8]) -> Result<ClientFrame, ProtocolError> {
    complete(line, map(step, ClientFrame::Step))
}

fn complete<'a, O, P>(line: &'a [u8], parser: P) -> Result<O, ProtocolError>
where
    P: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    match all_consuming(parser)(line) {
        Ok((_, out)) => Ok(out),
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::Verify => {
            Err(ProtocolError::InvalidBase64)
        }
        Err(_) => Err(ProtocolError::Malformed(
            String::from_utf8_lossy(line).into_owned(),
        )),
    }
}

// ---------------------

// RFC4422 restricts names to upper case letters, digits, hyphens and underscores,
// we are a bit more tolerant on the case.
fn is_mechanism_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

fn mechanism(input: &[u8]) -> IResult<&[u8], String> {
    map(take_while1(is_mechanism_char), |m: &[u8]| {
        String::from_utf8_lossy(m).into_owned()
    })(input)
}

fn mechanisms(input: &[u8]) -> IResult<&[u8], MechanismList> {
    map(
        delimited(space0, separated_list0(space1, mechanism), space0),
        MechanismList,
    )(input)
}

fn first_step_frame(input: &[u8]) -> IResult<&[u8], ClientFrame> {
    map(
        pair(mechanism, opt(preceded(char(' '), payload))),
        |(mechanism, initial_response)| ClientFrame::FirstStep {
            mechanism,
            initial_response,
        },
    )(input)
}

fn step(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    map(preceded(tag(b"C"), opt(preceded(char(','), payload))), |p| {
        p.unwrap_or_default()
    })(input)
}

/// Only the tag of a verdict matters, whatever follows the first `,` is ignored
fn verdict<'a>(t: &'static [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    terminated(tag(t), opt(pair(char(','), rest)))
}

fn server_step_frame(input: &[u8]) -> IResult<&[u8], ServerFrame> {
    alt((
        value(ServerFrame::Success, verdict(b"A")),
        value(ServerFrame::Failure, verdict(b"E")),
        map(step, ServerFrame::Step),
    ))(input)
}

fn is_base64_core(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'+' || c == b'/'
}

fn is_base64_pad(c: u8) -> bool {
    c == b'='
}

/// Padding is accepted but not required, an empty string is an empty payload
fn payload(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (input, (b64, _)) = pair(take_while(is_base64_core), take_while(is_base64_pad))(input)?;

    let data = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(b64)
        .map_err(|_| nom::Err::Failure(Error::new(input, ErrorKind::Verify)))?;

    Ok((input, data))
}

// -----------------------------------------------------------------
//
// SASL DECODING
//
// -----------------------------------------------------------------

fn not_null(c: u8) -> bool {
    c != 0x0
}

// impersonated user, login, password
pub fn auth_plain<'a>(input: &'a [u8]) -> IResult<&'a [u8], (&'a [u8], &'a [u8], &'a [u8])> {
    map(
        tuple((
            take_while(not_null),
            take(1usize),
            take_while(not_null),
            take(1usize),
            rest,
        )),
        |(imp, _, user, _, pass)| (imp, user, pass),
    )(input)
}
