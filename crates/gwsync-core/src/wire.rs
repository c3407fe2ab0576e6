//! Bus frame codec.
//!
//! Events travel over the correlation bus as strings shaped
//! `tag::json-payload`, with `::` as the separator. Two frames are special:
//! the bare [`END_MARKER`] closes a finite stream, and frames tagged
//! [`ERROR_TAG`] carry a serialized [`CodeMsg`]. Payloads are JSON; the
//! payload itself may contain `::` freely since only the first separator
//! splits the frame.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{CodeMsg, GwError};

/// Field separator inside a frame.
pub const SEP: &str = "::";

/// Terminal frame of a finite stream.
pub const END_MARKER: &str = "end";

/// Tag of a frame carrying a gateway error.
pub const ERROR_TAG: &str = "error";

/// Serialize a payload to its JSON frame body.
pub fn encode<T: Serialize>(value: &T) -> Result<String, GwError> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a JSON frame body.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GwError> {
    Ok(serde_json::from_str(body)?)
}

/// Build a `tag::body` frame.
pub fn frame(tag: &str, body: &str) -> String {
    let mut out = String::with_capacity(tag.len() + SEP.len() + body.len());
    out.push_str(tag);
    out.push_str(SEP);
    out.push_str(body);
    out
}

/// Build a tagged frame from a serializable payload.
pub fn tagged<T: Serialize>(tag: &str, value: &T) -> Result<String, GwError> {
    Ok(frame(tag, &encode(value)?))
}

/// Split a frame into `(tag, body)` at the first separator.
pub fn split_frame(msg: &str) -> Result<(&str, &str), GwError> {
    msg.split_once(SEP)
        .ok_or_else(|| GwError::BadFrame(msg.into()))
}

/// True for the terminal frame of a finite stream.
pub fn is_end(msg: &str) -> bool {
    msg == END_MARKER
}

/// Build an error frame from a gateway `(code, message)` pair.
pub fn error_frame(cm: &CodeMsg) -> String {
    // CodeMsg serialization cannot fail; fall back to a bare code on the
    // off chance it does.
    match encode(cm) {
        Ok(body) => frame(ERROR_TAG, &body),
        Err(_) => frame(ERROR_TAG, &format!(r#"{{"code":{},"message":""}}"#, cm.code)),
    }
}

/// Decode an error frame, if this frame is one.
pub fn as_error(msg: &str) -> Option<Result<CodeMsg, GwError>> {
    let (tag, body) = msg.split_once(SEP)?;
    if tag != ERROR_TAG {
        return None;
    }
    Some(decode(body))
}
