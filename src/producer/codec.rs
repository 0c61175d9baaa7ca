//! Scribe wire codec.
//!
//! The collector speaks the Thrift binary protocol over framed transport:
//! every message is a 4-byte big-endian length followed by that many payload
//! bytes. The only call issued is
//!
//! ```text
//! ResultCode Log(1: list<LogEntry> messages)
//! struct LogEntry { 1: string category, 2: string message }
//! enum ResultCode { OK = 0, TRY_LATER = 1 }
//! ```
//!
//! Messages are written in non-strict mode (method name, message type byte,
//! sequence id) which every Scribe server accepts. The collector-side half
//! ([`decode_log_request`], [`encode_log_response`]) exists so mock
//! collectors and relays can share the same encoding rules.

use std::io::{self, Read};

use thiserror::Error;
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TMessageIdentifier, TMessageType, TOutputProtocol, TStructIdentifier, TType,
};

use crate::log_record::LogRecord;

/// Name of the remote method that accepts log batches.
pub const LOG_METHOD: &str = "Log";
/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Result returned by the collector for one `Log` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    /// Every entry in the call was accepted.
    Ok,
    /// The collector is overloaded; the entries must be resent later.
    TryLater,
}

impl ResultCode {
    /// Wire value of the result code.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::TryLater => 1,
        }
    }
}

impl TryFrom<i32> for ResultCode {
    type Error = CodecError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::TryLater),
            other => Err(CodecError::UnknownResultCode(other)),
        }
    }
}

/// Errors raised while encoding or decoding Scribe messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The Thrift protocol layer rejected the bytes.
    #[error("thrift protocol error: {0}")]
    Thrift(#[from] thrift::Error),
    /// The payload is longer than a frame header can describe.
    #[error("payload of {0} bytes does not fit in a frame")]
    FrameTooLarge(usize),
    /// A message arrived with the wrong Thrift message type.
    #[error("unexpected message type {0:?}")]
    UnexpectedMessageType(TMessageType),
    /// A message named a method other than `Log`.
    #[error("unexpected method {0:?}")]
    UnexpectedMethod(String),
    /// The reply does not answer the call that was sent.
    #[error("sequence id mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: i32, actual: i32 },
    /// The collector answered with a Thrift application exception.
    #[error("collector raised an exception: {0}")]
    RemoteException(String),
    /// A required field was absent.
    #[error("{0} missing from message")]
    MissingField(&'static str),
    /// The reply carried a result code outside the Scribe enum.
    #[error("unknown result code {0}")]
    UnknownResultCode(i32),
}

/// Frame the payload with a big-endian length prefix.
pub fn frame_payload(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len =
        u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge(payload.len()))?;
    let mut framed = Vec::with_capacity(payload.len() + FRAME_HEADER_LEN);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Read one frame from `reader`, rejecting lengths above `max_size`.
///
/// A short read surfaces as [`io::ErrorKind::UnexpectedEof`]; either way the
/// stream can no longer be trusted.
pub fn read_frame<R: Read>(reader: &mut R, max_size: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit of {max_size} bytes"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Encode a framed `Log` call carrying `records` in order.
pub fn encode_log_request(records: &[LogRecord], seq_id: i32) -> Result<Vec<u8>, CodecError> {
    let size_hint: usize = records.iter().map(|r| r.payload_len() + 16).sum();
    let mut payload = Vec::with_capacity(size_hint + 32);
    {
        let mut o = TBinaryOutputProtocol::new(&mut payload, false);
        o.write_message_begin(&TMessageIdentifier::new(
            LOG_METHOD,
            TMessageType::Call,
            seq_id,
        ))?;
        o.write_struct_begin(&TStructIdentifier::new("Log_args"))?;
        o.write_field_begin(&TFieldIdentifier::new("messages", TType::List, 1))?;
        let len = i32::try_from(records.len())
            .map_err(|_| CodecError::FrameTooLarge(records.len()))?;
        o.write_list_begin(&TListIdentifier::new(TType::Struct, len))?;
        for record in records {
            write_log_entry(&mut o, record)?;
        }
        o.write_list_end()?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        o.write_message_end()?;
        o.flush()?;
    }
    frame_payload(&payload)
}

fn write_log_entry(o: &mut dyn TOutputProtocol, record: &LogRecord) -> thrift::Result<()> {
    o.write_struct_begin(&TStructIdentifier::new("LogEntry"))?;
    o.write_field_begin(&TFieldIdentifier::new("category", TType::String, 1))?;
    o.write_string(&record.category)?;
    o.write_field_end()?;
    o.write_field_begin(&TFieldIdentifier::new("message", TType::String, 2))?;
    o.write_string(&record.message)?;
    o.write_field_end()?;
    o.write_field_stop()?;
    o.write_struct_end()
}

/// Decode the (unframed) reply to the `Log` call sent with `expected_seq`.
pub fn decode_log_response(payload: &[u8], expected_seq: i32) -> Result<ResultCode, CodecError> {
    let mut i = TBinaryInputProtocol::new(payload, false);
    let ident = i.read_message_begin()?;
    if ident.name != LOG_METHOD {
        return Err(CodecError::UnexpectedMethod(ident.name));
    }
    match ident.message_type {
        TMessageType::Reply => {}
        TMessageType::Exception => {
            return Err(CodecError::RemoteException(read_exception_message(&mut i)?));
        }
        other => return Err(CodecError::UnexpectedMessageType(other)),
    }
    if ident.sequence_number != expected_seq {
        return Err(CodecError::SequenceMismatch {
            expected: expected_seq,
            actual: ident.sequence_number,
        });
    }

    i.read_struct_begin()?;
    let mut success = None;
    loop {
        let field = i.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        match (field.id, field.field_type) {
            (Some(0), TType::I32) => success = Some(i.read_i32()?),
            (_, other) => i.skip(other)?,
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    i.read_message_end()?;

    ResultCode::try_from(success.ok_or(CodecError::MissingField("success"))?)
}

fn read_exception_message(i: &mut dyn TInputProtocol) -> Result<String, CodecError> {
    i.read_struct_begin()?;
    let mut message = String::new();
    loop {
        let field = i.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        match (field.id, field.field_type) {
            (Some(1), TType::String) => message = i.read_string()?,
            (_, other) => i.skip(other)?,
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    Ok(message)
}

/// Decode an (unframed) `Log` call, returning its sequence id and entries.
pub fn decode_log_request(payload: &[u8]) -> Result<(i32, Vec<LogRecord>), CodecError> {
    let mut i = TBinaryInputProtocol::new(payload, false);
    let ident = i.read_message_begin()?;
    if ident.message_type != TMessageType::Call {
        return Err(CodecError::UnexpectedMessageType(ident.message_type));
    }
    if ident.name != LOG_METHOD {
        return Err(CodecError::UnexpectedMethod(ident.name));
    }

    i.read_struct_begin()?;
    let mut records = None;
    loop {
        let field = i.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        match (field.id, field.field_type) {
            (Some(1), TType::List) => {
                let list = i.read_list_begin()?;
                let mut entries = Vec::with_capacity(usize::try_from(list.size).unwrap_or(0));
                for _ in 0..list.size {
                    entries.push(read_log_entry(&mut i)?);
                }
                i.read_list_end()?;
                records = Some(entries);
            }
            (_, other) => i.skip(other)?,
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    i.read_message_end()?;

    let records = records.ok_or(CodecError::MissingField("messages"))?;
    Ok((ident.sequence_number, records))
}

fn read_log_entry(i: &mut dyn TInputProtocol) -> Result<LogRecord, CodecError> {
    i.read_struct_begin()?;
    let mut category = None;
    let mut message = None;
    loop {
        let field = i.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        match (field.id, field.field_type) {
            (Some(1), TType::String) => category = Some(i.read_string()?),
            (Some(2), TType::String) => message = Some(i.read_string()?),
            (_, other) => i.skip(other)?,
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    Ok(LogRecord {
        category: category.ok_or(CodecError::MissingField("category"))?,
        message: message.ok_or(CodecError::MissingField("message"))?,
    })
}

/// Encode a framed reply to the `Log` call with sequence id `seq_id`.
pub fn encode_log_response(code: ResultCode, seq_id: i32) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::with_capacity(32);
    {
        let mut o = TBinaryOutputProtocol::new(&mut payload, false);
        o.write_message_begin(&TMessageIdentifier::new(
            LOG_METHOD,
            TMessageType::Reply,
            seq_id,
        ))?;
        o.write_struct_begin(&TStructIdentifier::new("Log_result"))?;
        o.write_field_begin(&TFieldIdentifier::new("success", TType::I32, 0))?;
        o.write_i32(code.as_i32())?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        o.write_message_end()?;
        o.flush()?;
    }
    frame_payload(&payload)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    fn unframe(frame: &[u8]) -> &[u8] {
        &frame[FRAME_HEADER_LEN..]
    }

    fn encode_reply(
        message_type: TMessageType,
        seq_id: i32,
        write_body: impl FnOnce(&mut dyn TOutputProtocol),
    ) -> Vec<u8> {
        let mut payload = Vec::new();
        {
            let mut o = TBinaryOutputProtocol::new(&mut payload, false);
            o.write_message_begin(&TMessageIdentifier::new(LOG_METHOD, message_type, seq_id))
                .expect("message header");
            write_body(&mut o);
            o.write_message_end().expect("message end");
        }
        payload
    }

    #[rstest]
    fn frame_prefix_matches_payload_length() {
        let frame = encode_log_request(&[LogRecord::new("default", "hello world")], 0)
            .expect("encode request");
        let mut prefix = [0u8; FRAME_HEADER_LEN];
        prefix.copy_from_slice(&frame[..FRAME_HEADER_LEN]);
        assert_eq!(u32::from_be_bytes(prefix) as usize, frame.len() - FRAME_HEADER_LEN);
    }

    #[rstest]
    fn request_uses_non_strict_message_header() {
        let frame = encode_log_request(&[LogRecord::new("c", "m")], 7).expect("encode request");
        let payload = unframe(&frame);
        // name length, "Log", message type (call), sequence id
        assert_eq!(&payload[..4], &3i32.to_be_bytes());
        assert_eq!(&payload[4..7], b"Log");
        assert_eq!(payload[7], 1);
        assert_eq!(&payload[8..12], &7i32.to_be_bytes());
    }

    #[rstest]
    fn request_decodes_to_the_same_entries_in_order() {
        let records = vec![
            LogRecord::new("default", "hello world"),
            LogRecord::new("audit", "üñîçødé ✓"),
            LogRecord::new("", ""),
        ];
        let frame = encode_log_request(&records, 42).expect("encode request");
        let (seq, decoded) = decode_log_request(unframe(&frame)).expect("decode request");
        assert_eq!(seq, 42);
        assert_eq!(decoded, records);
    }

    #[rstest]
    #[case(ResultCode::Ok)]
    #[case(ResultCode::TryLater)]
    fn response_result_codes_decode(#[case] code: ResultCode) {
        let frame = encode_log_response(code, 3).expect("encode response");
        let decoded = decode_log_response(unframe(&frame), 3).expect("decode response");
        assert_eq!(decoded, code);
    }

    #[rstest]
    fn response_with_wrong_sequence_is_rejected() {
        let frame = encode_log_response(ResultCode::Ok, 4).expect("encode response");
        let err = decode_log_response(unframe(&frame), 5).expect_err("mismatch must fail");
        assert!(matches!(
            err,
            CodecError::SequenceMismatch { expected: 5, actual: 4 }
        ));
    }

    #[rstest]
    fn unknown_result_code_is_rejected() {
        let payload = encode_reply(TMessageType::Reply, 1, |o| {
            o.write_struct_begin(&TStructIdentifier::new("Log_result")).unwrap();
            o.write_field_begin(&TFieldIdentifier::new("success", TType::I32, 0)).unwrap();
            o.write_i32(9).unwrap();
            o.write_field_end().unwrap();
            o.write_field_stop().unwrap();
            o.write_struct_end().unwrap();
        });
        let err = decode_log_response(&payload, 1).expect_err("code 9 must fail");
        assert!(matches!(err, CodecError::UnknownResultCode(9)));
    }

    #[rstest]
    fn reply_without_success_field_is_rejected() {
        let payload = encode_reply(TMessageType::Reply, 1, |o| {
            o.write_struct_begin(&TStructIdentifier::new("Log_result")).unwrap();
            o.write_field_stop().unwrap();
            o.write_struct_end().unwrap();
        });
        let err = decode_log_response(&payload, 1).expect_err("missing result must fail");
        assert!(matches!(err, CodecError::MissingField("success")));
    }

    #[rstest]
    fn exception_reply_surfaces_message() {
        let payload = encode_reply(TMessageType::Exception, 1, |o| {
            o.write_struct_begin(&TStructIdentifier::new("TApplicationException")).unwrap();
            o.write_field_begin(&TFieldIdentifier::new("message", TType::String, 1)).unwrap();
            o.write_string("internal error").unwrap();
            o.write_field_end().unwrap();
            o.write_field_begin(&TFieldIdentifier::new("type", TType::I32, 2)).unwrap();
            o.write_i32(6).unwrap();
            o.write_field_end().unwrap();
            o.write_field_stop().unwrap();
            o.write_struct_end().unwrap();
        });
        let err = decode_log_response(&payload, 1).expect_err("exception must fail");
        assert!(matches!(err, CodecError::RemoteException(msg) if msg == "internal error"));
    }

    #[rstest]
    fn truncated_reply_is_a_protocol_error() {
        let frame = encode_log_response(ResultCode::Ok, 1).expect("encode response");
        let payload = unframe(&frame);
        let err = decode_log_response(&payload[..payload.len() - 3], 1)
            .expect_err("truncated payload must fail");
        assert!(matches!(err, CodecError::Thrift(_)));
    }

    #[rstest]
    fn read_frame_returns_payload() {
        let frame = frame_payload(&[1, 2, 3]).expect("frame");
        assert_eq!(&frame[..4], &3u32.to_be_bytes());
        let payload = read_frame(&mut Cursor::new(frame), 16).expect("read frame");
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[rstest]
    fn read_frame_rejects_short_read() {
        let mut frame = frame_payload(&[1, 2, 3, 4]).expect("frame");
        frame.truncate(frame.len() - 1);
        let err = read_frame(&mut Cursor::new(frame), 16).expect_err("short read must fail");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[rstest]
    fn read_frame_enforces_limit() {
        let frame = frame_payload(&[0u8; 32]).expect("frame");
        let err = read_frame(&mut Cursor::new(frame), 16).expect_err("oversized frame must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
