//! DNS wire format codec (RFC 1035).
//!
//! Decodes a raw message into a [`Message`] (header, questions and the three
//! resource record sections) and encodes it back, compressing repeated name
//! suffixes with backward pointers. Only A/AAAA/IN carry meaning elsewhere in
//! the crate; every other type is kept as opaque rdata.

use crate::error::WireError;
use std::collections::HashMap;
use std::fmt;

// DNS wire format constants
pub const HEADER_SIZE: usize = 12;
pub const FLAG_QR: u16 = 0x8000; // Query/Response flag
pub const FLAG_RD: u16 = 0x0100; // Recursion desired
pub const FLAG_RA: u16 = 0x0080; // Recursion available

pub const TYPE_A: u16 = 1;
pub const TYPE_AAAA: u16 = 28;
pub const CLASS_IN: u16 = 1;

// RFC 1035: Maximum label length is 63 characters
const MAX_LABEL_LEN: usize = 63;
// Pointer jumps followed while decoding a single name
const MAX_POINTER_DEPTH: usize = 64;
// Largest offset a 14-bit compression pointer can address
const MAX_POINTER_OFFSET: usize = 0x3FFF;
const POINTER_TAG: u8 = 0xC0;

const TYPE_NS: u16 = 2;
const TYPE_CNAME: u16 = 5;
const TYPE_SOA: u16 = 6;
const TYPE_PTR: u16 = 12;
const TYPE_MX: u16 = 15;
const TYPE_TXT: u16 = 16;
const TYPE_ANY: u16 = 255;

/// DNS record types, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    A,
    AAAA,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    ANY,
    Other(u16),
}

impl RecordType {
    /// Create from raw type value
    pub fn from_u16(value: u16) -> Self {
        match value {
            TYPE_A => RecordType::A,
            TYPE_AAAA => RecordType::AAAA,
            TYPE_NS => RecordType::NS,
            TYPE_CNAME => RecordType::CNAME,
            TYPE_SOA => RecordType::SOA,
            TYPE_PTR => RecordType::PTR,
            TYPE_MX => RecordType::MX,
            TYPE_TXT => RecordType::TXT,
            TYPE_ANY => RecordType::ANY,
            other => RecordType::Other(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::ANY => write!(f, "ANY"),
            RecordType::Other(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// Fixed 12-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl Header {
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }
}

/// Question section entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub qname: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(qname: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Question {
            qname: qname.into(),
            qtype,
            qclass,
        }
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::from_u16(self.qtype)
    }

    /// True for A or AAAA in class IN, the only queries answered locally
    pub fn is_address_query(&self) -> bool {
        (self.qtype == TYPE_A || self.qtype == TYPE_AAAA) && self.qclass == CLASS_IN
    }
}

/// Answer, authority or additional record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl ResourceRecord {
    pub fn new(name: impl Into<String>, rtype: u16, rclass: u16, ttl: u32, rdata: Vec<u8>) -> Self {
        ResourceRecord {
            name: name.into(),
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    pub fn is_address(&self) -> bool {
        (self.rtype == TYPE_A || self.rtype == TYPE_AAAA) && self.rclass == CLASS_IN
    }
}

/// A complete DNS message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// Parse a DNS message from raw bytes.
    ///
    /// Section lengths are taken from the header counts; a buffer that ends
    /// before all announced entries are read fails with `TruncatedMessage`.
    pub fn parse(buf: &[u8]) -> Result<Message, WireError> {
        let mut reader = Reader::new(buf);

        let header = Header {
            id: reader.read_u16()?,
            flags: reader.read_u16()?,
            qd_count: reader.read_u16()?,
            an_count: reader.read_u16()?,
            ns_count: reader.read_u16()?,
            ar_count: reader.read_u16()?,
        };

        let mut questions = Vec::with_capacity(header.qd_count.min(16) as usize);
        for _ in 0..header.qd_count {
            questions.push(reader.read_question()?);
        }
        let answers = reader.read_records(header.an_count)?;
        let authorities = reader.read_records(header.ns_count)?;
        let additionals = reader.read_records(header.ar_count)?;

        Ok(Message {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    /// Serialize with name compression.
    ///
    /// Header counts are recomputed from the section lengths; the counts in
    /// `self.header` are ignored.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        self.encode(Encoder::compressed())
    }

    /// Serialize writing every name in full
    pub fn to_bytes_uncompressed(&self) -> Result<Vec<u8>, WireError> {
        self.encode(Encoder::uncompressed())
    }

    fn encode(&self, mut encoder: Encoder) -> Result<Vec<u8>, WireError> {
        encoder.write_u16(self.header.id);
        encoder.write_u16(self.header.flags);
        encoder.write_u16(section_count(self.questions.len())?);
        encoder.write_u16(section_count(self.answers.len())?);
        encoder.write_u16(section_count(self.authorities.len())?);
        encoder.write_u16(section_count(self.additionals.len())?);

        for question in &self.questions {
            encoder.write_name(&question.qname)?;
            encoder.write_u16(question.qtype);
            encoder.write_u16(question.qclass);
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            encoder.write_record(record)?;
        }

        Ok(encoder.finish())
    }
}

fn section_count(len: usize) -> Result<u16, WireError> {
    u16::try_from(len).map_err(|_| WireError::TooManyEntries(len))
}

/// Decode the domain name starting at `start`.
///
/// Returns the dot-joined name and the offset just past the name in the
/// original position (a pointer ends the name after its two bytes).
/// Pointer offsets are absolute positions in `buf`.
pub fn parse_name(buf: &[u8], start: usize) -> Result<(String, usize), WireError> {
    let mut labels: Vec<&str> = Vec::new();
    let mut pos = start;
    let mut end_pos: Option<usize> = None;
    let mut jumps = 0;

    loop {
        let len = *buf.get(pos).ok_or(WireError::TruncatedMessage)?;

        match len & POINTER_TAG {
            POINTER_TAG => {
                let low = *buf.get(pos + 1).ok_or(WireError::TruncatedMessage)?;
                if end_pos.is_none() {
                    end_pos = Some(pos + 2);
                }
                jumps += 1;
                if jumps > MAX_POINTER_DEPTH {
                    return Err(WireError::CompressionLoop);
                }
                pos = (((len & !POINTER_TAG) as usize) << 8) | low as usize;
            }
            0 if len == 0 => {
                let end = end_pos.unwrap_or(pos + 1);
                return Ok((labels.join("."), end));
            }
            0 => {
                let len = len as usize;
                let raw = buf
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(WireError::TruncatedMessage)?;
                if raw.contains(&b'.') {
                    return Err(WireError::DotInLabel);
                }
                let label = std::str::from_utf8(raw).map_err(|_| WireError::NonUtf8Label)?;
                labels.push(label);
                pos += 1 + len;
            }
            // 0b01 and 0b10 prefixes are reserved
            _ => return Err(WireError::InvalidLabelLength(len as usize)),
        }
    }
}

/// Cursor over an immutable message buffer
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(WireError::TruncatedMessage)?;
        self.pos += len;
        Ok(bytes)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_name(&mut self) -> Result<String, WireError> {
        let (name, end) = parse_name(self.buf, self.pos)?;
        self.pos = end;
        Ok(name)
    }

    fn read_question(&mut self) -> Result<Question, WireError> {
        let qname = self.read_name()?;
        let qtype = self.read_u16()?;
        let qclass = self.read_u16()?;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    fn read_record(&mut self) -> Result<ResourceRecord, WireError> {
        let name = self.read_name()?;
        let rtype = self.read_u16()?;
        let rclass = self.read_u16()?;
        let ttl = self.read_u32()?;
        let rdlength = self.read_u16()? as usize;
        let rdata = self.read_bytes(rdlength)?.to_vec();
        Ok(ResourceRecord {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        })
    }

    fn read_records(&mut self, count: u16) -> Result<Vec<ResourceRecord>, WireError> {
        let mut records = Vec::with_capacity(count.min(16) as usize);
        for _ in 0..count {
            records.push(self.read_record()?);
        }
        Ok(records)
    }
}

/// Output buffer plus the suffix -> offset memo used for compression
struct Encoder {
    buf: Vec<u8>,
    memo: Option<HashMap<String, usize>>,
}

impl Encoder {
    fn compressed() -> Self {
        Encoder {
            buf: Vec::with_capacity(512),
            memo: Some(HashMap::new()),
        }
    }

    fn uncompressed() -> Self {
        Encoder {
            buf: Vec::with_capacity(512),
            memo: None,
        }
    }

    fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write `name`, longest suffix first. The first suffix already in the
    /// memo becomes a pointer and ends the name.
    fn write_name(&mut self, name: &str) -> Result<(), WireError> {
        let name = name.strip_suffix('.').unwrap_or(name);
        let mut rest = name;

        while !rest.is_empty() {
            if let Some(memo) = self.memo.as_mut() {
                if let Some(&offset) = memo.get(rest) {
                    self.write_u16(((POINTER_TAG as u16) << 8) | offset as u16);
                    return Ok(());
                }
                if self.buf.len() <= MAX_POINTER_OFFSET {
                    memo.insert(rest.to_string(), self.buf.len());
                }
            }

            let (label, tail) = rest.split_once('.').unwrap_or((rest, ""));
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(WireError::InvalidLabelLength(label.len()));
            }
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label.as_bytes());
            rest = tail;
        }

        self.buf.push(0);
        Ok(())
    }

    fn write_record(&mut self, record: &ResourceRecord) -> Result<(), WireError> {
        let rdlength = u16::try_from(record.rdata.len())
            .map_err(|_| WireError::RdataTooLong(record.rdata.len()))?;

        self.write_name(&record.name)?;
        self.write_u16(record.rtype);
        self.write_u16(record.rclass);
        self.write_u32(record.ttl);
        self.write_u16(rdlength);
        self.buf.extend_from_slice(&record.rdata);
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ==================== Helper for building DNS packets (tests) ====================
