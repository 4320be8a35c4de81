//! Typed message encode/decode.
//!
//! Every message is framed as `[1 byte type][4 bytes big-endian length][payload]`.
//! The payload itself is MessagePack (`rmp_serde`) over plain `serde`-derived
//! structs, and the wire format assumes nothing about the schema beyond
//! the fields listed below.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};

use crate::errors::*;

pub const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRecordPayload {
	pub log_name: String,
	pub data: String,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLogPositionPayload {
	pub log_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPositionResponsePayload {
	pub log_name: String,
	pub position: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLogContentPayload {
	pub log_name: String,
	pub request_id: u64,
	pub begin_record: u64,
	pub end_record: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum ContentStatus {
	Found = 0,
	End = 1,
	NotFound = -1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogContentStatusPayload {
	pub request_id: u64,
	pub status: ContentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogContentDataPayload {
	pub request_id: u64,
	pub begin_record: u64,
	pub end_record: u64,
	pub records: Vec<String>,
}

/// One decoded wire message. The variant order matches the type codes
/// (1..=6); `type_code` and `decode` must stay in sync with each other.
#[derive(Debug, Clone)]
pub enum Message {
	AddRecord(AddRecordPayload),
	GetLogPosition(GetLogPositionPayload),
	LogPositionResponse(LogPositionResponsePayload),
	GetLogContent(GetLogContentPayload),
	LogContentStatus(LogContentStatusPayload),
	LogContentData(LogContentDataPayload),
}

impl Message {
	pub fn type_code(&self) -> u8 {
		match self {
			Message::AddRecord(_) => 1,
			Message::GetLogPosition(_) => 2,
			Message::LogPositionResponse(_) => 3,
			Message::GetLogContent(_) => 4,
			Message::LogContentStatus(_) => 5,
			Message::LogContentData(_) => 6,
		}
	}

	/// Serialises this message to a full `[type][length][payload]` frame.
	pub fn encode(&self) -> Result<Vec<u8>> {
		let payload = match self {
			Message::AddRecord(p) => rmps::to_vec(p)?,
			Message::GetLogPosition(p) => rmps::to_vec(p)?,
			Message::LogPositionResponse(p) => rmps::to_vec(p)?,
			Message::GetLogContent(p) => rmps::to_vec(p)?,
			Message::LogContentStatus(p) => rmps::to_vec(p)?,
			Message::LogContentData(p) => rmps::to_vec(p)?,
		};

		let mut buffer = Vec::with_capacity(HEADER_LEN + payload.len());
		buffer.push(self.type_code());
		let mut len_bytes = [0u8; 4];
		BigEndian::write_u32(&mut len_bytes, payload.len() as u32);
		buffer.extend_from_slice(&len_bytes);
		buffer.extend_from_slice(&payload);
		Ok(buffer)
	}

	/// Parses a 5-byte frame header into `(type_code, body_len)`.
	pub fn parse_header(header: &[u8]) -> Result<(u8, usize)> {
		if header.len() != HEADER_LEN {
			bail!(ErrorKind::ProtocolViolation("short frame header".into()));
		}
		let type_code = header[0];
		if type_code < 1 || type_code > 6 {
			bail!(ErrorKind::ProtocolViolation(format!("unknown message type {}", type_code)));
		}
		let len = BigEndian::read_u32(&header[1..5]) as usize;
		Ok((type_code, len))
	}

	/// Decodes a message body given the type code read from the header.
	/// Enforces the per-type validation rules for each payload kind.
	pub fn decode(type_code: u8, body: &[u8]) -> Result<Message> {
		let msg = match type_code {
			1 => Message::AddRecord(rmps::from_slice(body)?),
			2 => Message::GetLogPosition(rmps::from_slice(body)?),
			3 => Message::LogPositionResponse(rmps::from_slice(body)?),
			4 => Message::GetLogContent(rmps::from_slice(body)?),
			5 => Message::LogContentStatus(rmps::from_slice(body)?),
			6 => {
				let payload: LogContentDataPayload = rmps::from_slice(body)?;
				if payload.end_record < payload.begin_record {
					bail!(ErrorKind::ProtocolViolation("end_record < begin_record".into()));
				}
				let expected = (payload.end_record - payload.begin_record + 1) as usize;
				if payload.records.len() != expected {
					bail!(ErrorKind::ProtocolViolation(format!(
						"expected {} records, got {}",
						expected,
						payload.records.len()
					)));
				}
				Message::LogContentData(payload)
			}
			other => bail!(ErrorKind::ProtocolViolation(format!("unknown message type {}", other))),
		};
		Ok(msg)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(msg: Message) {
		let encoded = msg.encode().unwrap();
		let (type_code, len) = Message::parse_header(&encoded[..HEADER_LEN]).unwrap();
		assert_eq!(len, encoded.len() - HEADER_LEN);
		let decoded = Message::decode(type_code, &encoded[HEADER_LEN..]).unwrap();
		assert_eq!(format!("{:?}", msg), format!("{:?}", decoded));
	}

	/// `decode(encode(m)) == m` for every kind.
	#[test]
	fn framing_roundtrips_every_kind() {
		roundtrip(Message::AddRecord(AddRecordPayload {
			log_name: "/t/a.log".into(),
			data: "hello".into(),
			timestamp: Utc::now(),
		}));
		roundtrip(Message::GetLogPosition(GetLogPositionPayload { log_name: "/t/a.log".into() }));
		roundtrip(Message::LogPositionResponse(LogPositionResponsePayload {
			log_name: "/t/a.log".into(),
			position: 5,
		}));
		roundtrip(Message::GetLogContent(GetLogContentPayload {
			log_name: "/t/a.log".into(),
			request_id: 1,
			begin_record: 0,
			end_record: 4,
		}));
		roundtrip(Message::LogContentStatus(LogContentStatusPayload {
			request_id: 1,
			status: ContentStatus::Found,
		}));
		roundtrip(Message::LogContentData(LogContentDataPayload {
			request_id: 1,
			begin_record: 0,
			end_record: 1,
			records: vec!["a".into(), "b".into()],
		}));
	}

	#[test]
	fn rejects_unknown_type_code() {
		let err = Message::parse_header(&[9, 0, 0, 0, 0]).unwrap_err();
		assert!(err.to_string().contains("unknown message type"));
	}

	#[test]
	fn rejects_mismatched_content_data_length() {
		let payload = LogContentDataPayload {
			request_id: 1,
			begin_record: 0,
			end_record: 4,
			records: vec!["only one".into()],
		};
		let encoded = rmps::to_vec(&payload).unwrap();
		let err = Message::decode(6, &encoded).unwrap_err();
		assert!(err.to_string().contains("expected 5 records"));
	}
}
