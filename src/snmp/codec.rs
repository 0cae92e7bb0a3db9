//! BER codec for SNMPv1/v2c messages
//!
//! Only what a polling manager needs: GetRequest, GetNextRequest and the
//! Response PDU, with the SMIv2 application types.

use std::fmt;
use std::str::FromStr;

use super::{SnmpError, SnmpResult};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn new(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Oid(arcs)
    }

    /// Last arc, which is the row index for single-index tables
    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }

    fn encode(&self) -> SnmpResult<Vec<u8>> {
        let [first, second, rest @ ..] = self.0.as_slice() else {
            return Err(SnmpError::Encode(format!("oid {self} needs two arcs")));
        };
        if *first > 2 || (*first < 2 && *second >= 40) {
            return Err(SnmpError::Encode(format!("oid {self} has invalid leading arcs")));
        }

        let mut out = Vec::with_capacity(self.0.len() + 4);
        encode_base128(first * 40 + second, &mut out);
        for arc in rest {
            encode_base128(*arc, &mut out);
        }
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> SnmpResult<Oid> {
        let mut arcs = Vec::with_capacity(bytes.len() + 1);
        let mut value: u32 = 0;
        let mut pending = false;

        for &byte in bytes {
            value = value
                .checked_mul(128)
                .and_then(|v| v.checked_add(u32::from(byte & 0x7f)))
                .ok_or_else(|| SnmpError::Decode("oid arc overflows u32".to_string()))?;
            pending = true;

            if byte & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
                pending = false;
            }
        }

        if pending || arcs.is_empty() {
            return Err(SnmpError::Decode("truncated oid".to_string()));
        }
        Ok(Oid(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut arcs = self.0.iter();
        if let Some(first) = arcs.next() {
            write!(f, "{first}")?;
        }
        for arc in arcs {
            write!(f, ".{arc}")?;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = SnmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('.')
            .split('.')
            .map(|arc| {
                arc.parse::<u32>()
                    .map_err(|_| SnmpError::Encode(format!("invalid oid {s:?}")))
            })
            .collect::<SnmpResult<Vec<_>>>()
            .map(Oid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    fn wire(&self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpVersion::V1 => f.write_str("v1"),
            SnmpVersion::V2c => f.write_str("v2c"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    Response,
}

impl PduType {
    fn tag(&self) -> u8 {
        match self {
            PduType::GetRequest => 0xa0,
            PduType::GetNextRequest => 0xa1,
            PduType::Response => 0xa2,
        }
    }

    fn from_tag(tag: u8) -> SnmpResult<Self> {
        match tag {
            0xa0 => Ok(PduType::GetRequest),
            0xa1 => Ok(PduType::GetNextRequest),
            0xa2 => Ok(PduType::Response),
            other => Err(SnmpError::Decode(format!("unsupported pdu tag {other:#04x}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// The v2c per-varbind exceptions
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(i64::from(*v)),
            Value::Counter64(v) => i64::try_from(*v).ok(),
            // some agents report numbers as strings
            Value::OctetString(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(u64::from(*v)),
            Value::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::OctetString(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
            other => other.as_u64().map(|v| v as f64).or_else(|| other.as_i64().map(|v| v as f64)),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectId(oid) => Some(oid),
            _ => None,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) -> SnmpResult<()> {
        match self {
            Value::Integer(v) => write_tlv(out, TAG_INTEGER, &encode_integer(*v)),
            Value::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
            Value::Null => write_tlv(out, TAG_NULL, &[]),
            Value::ObjectId(oid) => write_tlv(out, TAG_OID, &oid.encode()?),
            Value::IpAddress(octets) => write_tlv(out, TAG_IP_ADDRESS, octets),
            Value::Counter32(v) => write_tlv(out, TAG_COUNTER32, &encode_unsigned(u64::from(*v))),
            Value::Gauge32(v) => write_tlv(out, TAG_GAUGE32, &encode_unsigned(u64::from(*v))),
            Value::TimeTicks(v) => write_tlv(out, TAG_TIMETICKS, &encode_unsigned(u64::from(*v))),
            Value::Opaque(bytes) => write_tlv(out, TAG_OPAQUE, bytes),
            Value::Counter64(v) => write_tlv(out, TAG_COUNTER64, &encode_unsigned(*v)),
            Value::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
        }
        Ok(())
    }

    fn decode(tag: u8, content: &[u8]) -> SnmpResult<Value> {
        let unsigned32 = |content: &[u8]| -> SnmpResult<u32> {
            u32::try_from(decode_unsigned(content)?)
                .map_err(|_| SnmpError::Decode(format!("value of tag {tag:#04x} exceeds 32 bits")))
        };

        Ok(match tag {
            TAG_INTEGER => Value::Integer(decode_integer(content)?),
            TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
            TAG_NULL => Value::Null,
            TAG_OID => Value::ObjectId(Oid::decode(content)?),
            TAG_IP_ADDRESS => {
                let octets: [u8; 4] = content
                    .try_into()
                    .map_err(|_| SnmpError::Decode("ip address must be 4 bytes".to_string()))?;
                Value::IpAddress(octets)
            }
            TAG_COUNTER32 => Value::Counter32(unsigned32(content)?),
            TAG_GAUGE32 => Value::Gauge32(unsigned32(content)?),
            TAG_TIMETICKS => Value::TimeTicks(unsigned32(content)?),
            TAG_OPAQUE => Value::Opaque(content.to_vec()),
            TAG_COUNTER64 => Value::Counter64(decode_unsigned(content)?),
            TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
            other => return Err(SnmpError::Decode(format!("unknown value tag {other:#04x}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Request placeholder
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    pub fn request(
        version: SnmpVersion,
        community: &str,
        pdu_type: PduType,
        request_id: i32,
        oids: &[Oid],
    ) -> Self {
        Self {
            version,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                pdu_type,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: oids.iter().cloned().map(VarBind::null).collect(),
            },
        }
    }

    pub fn encode(&self) -> SnmpResult<Vec<u8>> {
        let mut varbinds = Vec::new();
        for varbind in &self.pdu.varbinds {
            let mut entry = Vec::new();
            write_tlv(&mut entry, TAG_OID, &varbind.oid.encode()?);
            varbind.value.encode(&mut entry)?;
            write_tlv(&mut varbinds, TAG_SEQUENCE, &entry);
        }

        let mut pdu = Vec::new();
        write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(i64::from(self.pdu.request_id)));
        write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_status));
        write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(self.pdu.error_index));
        write_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

        let mut message = Vec::new();
        write_tlv(&mut message, TAG_INTEGER, &encode_integer(self.version.wire()));
        write_tlv(&mut message, TAG_OCTET_STRING, &self.community);
        write_tlv(&mut message, self.pdu.pdu_type.tag(), &pdu);

        let mut out = Vec::with_capacity(message.len() + 4);
        write_tlv(&mut out, TAG_SEQUENCE, &message);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> SnmpResult<Message> {
        let mut outer = Reader::new(bytes);
        let mut message = Reader::new(outer.expect(TAG_SEQUENCE)?);

        let version = match decode_integer(message.expect(TAG_INTEGER)?)? {
            0 => SnmpVersion::V1,
            1 => SnmpVersion::V2c,
            other => return Err(SnmpError::Decode(format!("unsupported version {other}"))),
        };
        let community = message.expect(TAG_OCTET_STRING)?.to_vec();

        let (tag, pdu_bytes) = message.next_tlv()?;
        let pdu_type = PduType::from_tag(tag)?;
        let mut pdu = Reader::new(pdu_bytes);

        let request_id = i32::try_from(decode_integer(pdu.expect(TAG_INTEGER)?)?)
            .map_err(|_| SnmpError::Decode("request id out of range".to_string()))?;
        let error_status = decode_integer(pdu.expect(TAG_INTEGER)?)?;
        let error_index = decode_integer(pdu.expect(TAG_INTEGER)?)?;

        let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
        let mut varbinds = Vec::new();
        while !list.is_empty() {
            let mut entry = Reader::new(list.expect(TAG_SEQUENCE)?);
            let oid = Oid::decode(entry.expect(TAG_OID)?)?;
            let (tag, content) = entry.next_tlv()?;
            varbinds.push(VarBind {
                oid,
                value: Value::decode(tag, content)?,
            });
        }

        Ok(Message {
            version,
            community,
            pdu: Pdu {
                pdu_type,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&mut self) -> SnmpResult<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| SnmpError::Decode("unexpected end of message".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn length(&mut self) -> SnmpResult<usize> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }

        let count = usize::from(first & 0x7f);
        if count == 0 || count > 4 {
            return Err(SnmpError::Decode(format!("unsupported length form {first:#04x}")));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn next_tlv(&mut self) -> SnmpResult<(u8, &'a [u8])> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| SnmpError::Decode(format!("length {len} overruns message")))?;
        let bytes = self.bytes;
        let content = &bytes[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> SnmpResult<&'a [u8]> {
        let (tag, content) = self.next_tlv()?;
        if tag != expected {
            return Err(SnmpError::Decode(format!(
                "expected tag {expected:#04x}, found {tag:#04x}"
            )));
        }
        Ok(content)
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
}

fn encode_base128(mut value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    loop {
        groups[n] = (value & 0x7f) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

/// Minimal two's complement
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Minimal big-endian with a leading zero when the top bit is set
fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn decode_integer(content: &[u8]) -> SnmpResult<i64> {
    if content.is_empty() || content.len() > 8 {
        return Err(SnmpError::Decode(format!(
            "integer of {} bytes",
            content.len()
        )));
    }
    let negative = content[0] & 0x80 != 0;
    let init: i64 = if negative { -1 } else { 0 };
    Ok(content
        .iter()
        .fold(init, |acc, byte| (acc << 8) | i64::from(*byte)))
}

/// Unsigned application types; agents do not always send the leading zero
fn decode_unsigned(content: &[u8]) -> SnmpResult<u64> {
    let trimmed = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(SnmpError::Decode(format!(
            "unsigned of {} bytes",
            content.len()
        )));
    }
    Ok(trimmed
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_encode_get_request() {
        let message = Message::request(
            SnmpVersion::V1,
            "public",
            PduType::GetRequest,
            1,
            &[oid("1.3.6.1.2.1.1.1.0")],
        );

        let expected: Vec<u8> = vec![
            0x30, 0x26, 0x02, 0x01, 0x00, 0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', 0xa0,
            0x19, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c,
            0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
        ];
        assert_eq!(message.encode().unwrap(), expected);
    }

    #[test]
    fn test_decode_response_with_counter64() {
        let bytes: Vec<u8> = vec![
            0x30, 0x44, 0x02, 0x01, 0x01, 0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', 0xa2,
            0x37, 0x02, 0x01, 0x4d, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x2c, 0x30, 0x14,
            0x06, 0x0b, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x1f, 0x01, 0x01, 0x01, 0x06, 0x03, 0x46,
            0x05, 0xe8, 0xd4, 0xa5, 0x10, 0x00, 0x30, 0x14, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x02,
            0x01, 0x01, 0x01, 0x00, 0x04, 0x08, b'R', b'o', b'u', b't', b'e', b'r', b'O', b'S',
        ];

        let message = Message::decode(&bytes).unwrap();
        assert_eq!(message.version, SnmpVersion::V2c);
        assert_eq!(message.pdu.pdu_type, PduType::Response);
        assert_eq!(message.pdu.request_id, 77);
        assert_eq!(message.pdu.varbinds.len(), 2);
        assert_eq!(message.pdu.varbinds[0].oid, oid("1.3.6.1.2.1.31.1.1.1.6.3"));
        assert_eq!(message.pdu.varbinds[0].value, Value::Counter64(1_000_000_000_000));
        assert_eq!(
            message.pdu.varbinds[1].value.as_text().as_deref(),
            Some("RouterOS")
        );
    }

    #[test]
    fn test_oid_with_large_arcs() {
        let enterprise = oid("1.3.6.1.4.1.14988.1");
        assert_eq!(
            enterprise.encode().unwrap(),
            vec![0x2b, 0x06, 0x01, 0x04, 0x01, 0xf5, 0x0c, 0x01]
        );
        assert_eq!(Oid::decode(&enterprise.encode().unwrap()).unwrap(), enterprise);
        assert_eq!(enterprise.to_string(), "1.3.6.1.4.1.14988.1");
    }

    #[test]
    fn test_integer_encoding_is_minimal() {
        assert_eq!(encode_integer(0), vec![0x00]);
        assert_eq!(encode_integer(-1), vec![0xff]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(-129), vec![0xff, 0x7f]);
        assert_eq!(decode_integer(&[0xff, 0x7f]).unwrap(), -129);
        assert_eq!(decode_integer(&[0x00, 0x80]).unwrap(), 128);
    }

    #[test]
    fn test_unsigned_gets_leading_zero() {
        assert_eq!(encode_unsigned(u64::from(u32::MAX)), vec![0x00, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encode_unsigned(5), vec![0x05]);
        assert_eq!(decode_unsigned(&[0x00, 0xff, 0xff, 0xff, 0xff]).unwrap(), 4_294_967_295);
    }

    #[test]
    fn test_long_form_length() {
        let mut out = Vec::new();
        write_tlv(&mut out, TAG_OCTET_STRING, &[0u8; 200]);
        assert_eq!(&out[..3], &[0x04, 0x81, 0xc8]);

        let mut reader = Reader::new(&out);
        let (tag, content) = reader.next_tlv().unwrap();
        assert_eq!(tag, TAG_OCTET_STRING);
        assert_eq!(content.len(), 200);
    }

    #[test]
    fn test_exception_values_decode() {
        let message = Message {
            version: SnmpVersion::V2c,
            community: b"public".to_vec(),
            pdu: Pdu {
                pdu_type: PduType::Response,
                request_id: 9,
                error_status: 0,
                error_index: 0,
                varbinds: vec![
                    VarBind::new(oid("1.3.6.1.2.1.1.1.0"), Value::NoSuchObject),
                    VarBind::new(oid("1.3.6.1.2.1.1.2.0"), Value::EndOfMibView),
                ],
            },
        };

        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert!(decoded.pdu.varbinds.iter().all(|vb| vb.value.is_exception()));
    }

    #[test]
    fn test_truncated_message_is_an_error() {
        let bytes = [0x30, 0x26, 0x02, 0x01];
        assert!(matches!(Message::decode(&bytes), Err(SnmpError::Decode(_))));
    }

    #[test]
    fn test_numeric_strings_are_numbers() {
        let value = Value::OctetString(b" 23.7 ".to_vec());
        assert_eq!(value.as_f64(), Some(23.7));
        assert_eq!(Value::Gauge32(40).as_f64(), Some(40.0));
        assert_eq!(Value::Integer(-71).as_f64(), Some(-71.0));
    }
}
