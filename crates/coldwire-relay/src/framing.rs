//! Wire framing for queued entries. Mirrors `internal/data/data.go`'s
//! `PrependLengthPrefix`/sender-prefixing, generalized to prepend the `ack_id` the Go original
//! never needed (its queue was flush-and-delete, not ack-driven).

use coldwire_types::constants::COLDWIRE_DATA_SEP;

use crate::error::RelayError;

/// `[3-byte BE length N][sender_id][0x00][ciphertext]`, length = N = the part after the prefix.
pub fn frame_entry(sender_id: &str, ciphertext: &[u8]) -> Result<Vec<u8>, RelayError> {
    if sender_id.as_bytes().contains(&COLDWIRE_DATA_SEP) {
        return Err(RelayError::BadRequest(format!(
            "sender id {sender_id:?} contains the reserved separator byte"
        )));
    }

    let mut payload = Vec::with_capacity(sender_id.len() + 1 + ciphertext.len());
    payload.extend_from_slice(sender_id.as_bytes());
    payload.push(COLDWIRE_DATA_SEP);
    payload.extend_from_slice(ciphertext);

    prepend_length_prefix(payload)
}

fn prepend_length_prefix(payload: Vec<u8>) -> Result<Vec<u8>, RelayError> {
    let len = payload.len();
    if len > 0xFF_FFFF {
        return Err(RelayError::BadRequest(
            "payload exceeds the 3-byte length prefix's addressable size".into(),
        ));
    }

    let mut framed = Vec::with_capacity(3 + payload.len());
    framed.push((len >> 16) as u8);
    framed.push((len >> 8) as u8);
    framed.push(len as u8);
    framed.extend(payload);
    Ok(framed)
}

/// Splits a frame's header to recover `sender_id` and `ciphertext`, given the part after the
/// 3-byte length prefix. Used by tests and by anything reconstructing a frame for inspection.
pub fn split_sender_and_ciphertext(body: &[u8]) -> Option<(&str, &[u8])> {
    let sep = body.iter().position(|&b| b == COLDWIRE_DATA_SEP)?;
    let sender = std::str::from_utf8(&body[..sep]).ok()?;
    Some((sender, &body[sep + 1..]))
}
