//! Binary encode/decode for complete envelope frames.
//!
//! The transport layer hands this module whole frames; there is no streaming
//! or partial decode. Layout is a leading `u8` tag followed by little-endian
//! fixed-width fields. Strings are a `u16` byte length plus UTF-8 bytes;
//! filter lists are `u16 declared_count`, `u16 scheme`, `u16 element_count`,
//! then `{u16 id, u16 mask}` elements. A response frame is the return-value
//! slot followed by the output slot, each a `u8` kind tag plus its value.
//!
//! Every encode builds one fully-formed buffer into a fresh `BytesMut`; no
//! builder state outlives the call. Decoding never reads past the supplied
//! buffer: short input yields `Truncated`, an unrecognized leading tag yields
//! `UnknownTag` instead of reaching the dispatch table.

use bytes::{BufMut, Bytes, BytesMut};

use super::protocol::{EventFilter, Request, Response, RetValue, SysTime};

mod tag {
    pub const RUN_LOOP: u8 = 0x00;
    pub const PERF_LOG_ADD: u8 = 0x01;
    pub const REGISTER_APP: u8 = 0x02;
    pub const EXIT_APP: u8 = 0x03;
    pub const SEND_EVENT: u8 = 0x04;
    pub const SEND_EVENT_WITH_ORIGINATOR: u8 = 0x05;
    pub const SEND_TIMED_EVENT: u8 = 0x06;
    pub const REGISTER_FILTERS: u8 = 0x07;
    pub const RESET_FILTER: u8 = 0x08;
    pub const RESET_ALL_FILTERS: u8 = 0x09;
    pub const TIME_GET_CURRENT: u8 = 0x0a;
    pub const TIME_GET_TAI: u8 = 0x0b;
    pub const TIME_GET_UTC: u8 = 0x0c;
    pub const TIME_CONVERT_MET_TO_SPACECRAFT: u8 = 0x0d;
    pub const TIME_GET_STCF: u8 = 0x0e;
    pub const TIME_GET_MET: u8 = 0x0f;
    pub const TIME_GET_MET_SECONDS: u8 = 0x10;
    pub const TIME_GET_MET_SUBSECONDS: u8 = 0x11;
    pub const TIME_GET_LEAP_SECONDS: u8 = 0x12;
    pub const TIME_GET_CLOCK_STATE: u8 = 0x13;
    pub const TIME_GET_CLOCK_INFO: u8 = 0x14;
}

mod ret_tag {
    pub const VOID: u8 = 0x00;
    pub const INT32: u8 = 0x01;
    pub const UINT32: u8 = 0x02;
    pub const INT16: u8 = 0x03;
    pub const UINT16: u8 = 0x04;
    pub const TIME: u8 = 0x05;
}

/// Protocol-level decode failure. Recorded in telemetry and reported; never
/// fatal to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized envelope tag {0:#04x}")]
    UnknownTag(u8),
    #[error("envelope truncated: {needed} more byte(s) required")]
    Truncated { needed: usize },
    #[error("event text is not valid UTF-8")]
    BadUtf8,
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.0.len() < n {
            return Err(DecodeError::Truncated {
                needed: n - self.0.len(),
            });
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = self.u16()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec()).map_err(|_| DecodeError::BadUtf8)
    }

    fn systime(&mut self) -> Result<SysTime, DecodeError> {
        Ok(SysTime {
            seconds: self.u32()?,
            subseconds: self.u32()?,
        })
    }
}

// Text longer than the u16 length prefix can describe is truncated at a char
// boundary, keeping the frame self-consistent and the text decodable.
fn put_string(buf: &mut BytesMut, s: &str) {
    let mut end = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_u16_le(end as u16);
    buf.put_slice(&s.as_bytes()[..end]);
}

fn put_systime(buf: &mut BytesMut, t: SysTime) {
    buf.put_u32_le(t.seconds);
    buf.put_u32_le(t.subseconds);
}

fn put_ret(buf: &mut BytesMut, v: &RetValue) {
    match v {
        RetValue::Void => buf.put_u8(ret_tag::VOID),
        RetValue::Int32(n) => {
            buf.put_u8(ret_tag::INT32);
            buf.put_i32_le(*n);
        }
        RetValue::UInt32(n) => {
            buf.put_u8(ret_tag::UINT32);
            buf.put_u32_le(*n);
        }
        RetValue::Int16(n) => {
            buf.put_u8(ret_tag::INT16);
            buf.put_i16_le(*n);
        }
        RetValue::UInt16(n) => {
            buf.put_u8(ret_tag::UINT16);
            buf.put_u16_le(*n);
        }
        RetValue::Time(t) => {
            buf.put_u8(ret_tag::TIME);
            put_systime(buf, *t);
        }
    }
}

fn read_ret(r: &mut Reader<'_>) -> Result<RetValue, DecodeError> {
    match r.u8()? {
        ret_tag::VOID => Ok(RetValue::Void),
        ret_tag::INT32 => Ok(RetValue::Int32(r.i32()?)),
        ret_tag::UINT32 => Ok(RetValue::UInt32(r.u32()?)),
        ret_tag::INT16 => Ok(RetValue::Int16(r.i16()?)),
        ret_tag::UINT16 => Ok(RetValue::UInt16(r.u16()?)),
        ret_tag::TIME => Ok(RetValue::Time(r.systime()?)),
        other => Err(DecodeError::UnknownTag(other)),
    }
}

/// Decode one request frame. Trailing bytes after the envelope are ignored.
pub fn decode_request(frame: &[u8]) -> Result<Request, DecodeError> {
    let mut r = Reader(frame);
    match r.u8()? {
        tag::RUN_LOOP => Ok(Request::RunLoop {
            exit_status: r.u32()?,
        }),
        tag::PERF_LOG_ADD => Ok(Request::PerfLogAdd {
            marker: r.u32()?,
            entry_exit: r.u32()?,
        }),
        tag::REGISTER_APP => Ok(Request::RegisterApp),
        tag::EXIT_APP => Ok(Request::ExitApp {
            exit_status: r.u32()?,
        }),
        tag::SEND_EVENT => Ok(Request::SendEvent {
            event_id: r.u16()?,
            event_type: r.u16()?,
            text: r.string()?,
        }),
        tag::SEND_EVENT_WITH_ORIGINATOR => Ok(Request::SendEventWithOriginator {
            event_id: r.u16()?,
            event_type: r.u16()?,
            originator: r.u32()?,
            text: r.string()?,
        }),
        tag::SEND_TIMED_EVENT => Ok(Request::SendTimedEvent {
            time: r.systime()?,
            event_id: r.u16()?,
            event_type: r.u16()?,
            text: r.string()?,
        }),
        tag::REGISTER_FILTERS => {
            let declared_count = r.u16()?;
            let scheme = r.u16()?;
            let element_count = r.u16()? as usize;
            let mut filters = Vec::with_capacity(element_count.min(256));
            for _ in 0..element_count {
                filters.push(EventFilter {
                    id: r.u16()?,
                    mask: r.u16()?,
                });
            }
            Ok(Request::RegisterFilters {
                declared_count,
                scheme,
                filters,
            })
        }
        tag::RESET_FILTER => Ok(Request::ResetFilter {
            event_id: r.u16()?,
        }),
        tag::RESET_ALL_FILTERS => Ok(Request::ResetAllFilters),
        tag::TIME_GET_CURRENT => Ok(Request::TimeGetCurrent),
        tag::TIME_GET_TAI => Ok(Request::TimeGetTai),
        tag::TIME_GET_UTC => Ok(Request::TimeGetUtc),
        tag::TIME_CONVERT_MET_TO_SPACECRAFT => Ok(Request::TimeConvertMetToSpacecraft {
            met: r.systime()?,
        }),
        tag::TIME_GET_STCF => Ok(Request::TimeGetStcf),
        tag::TIME_GET_MET => Ok(Request::TimeGetMet),
        tag::TIME_GET_MET_SECONDS => Ok(Request::TimeGetMetSeconds),
        tag::TIME_GET_MET_SUBSECONDS => Ok(Request::TimeGetMetSubseconds),
        tag::TIME_GET_LEAP_SECONDS => Ok(Request::TimeGetLeapSeconds),
        tag::TIME_GET_CLOCK_STATE => Ok(Request::TimeGetClockState),
        tag::TIME_GET_CLOCK_INFO => Ok(Request::TimeGetClockInfo),
        other => Err(DecodeError::UnknownTag(other)),
    }
}

/// Encode one request frame (peer side of the channel).
pub fn encode_request(request: &Request) -> Bytes {
    let mut buf = BytesMut::with_capacity(32);
    match request {
        Request::RunLoop { exit_status } => {
            buf.put_u8(tag::RUN_LOOP);
            buf.put_u32_le(*exit_status);
        }
        Request::PerfLogAdd { marker, entry_exit } => {
            buf.put_u8(tag::PERF_LOG_ADD);
            buf.put_u32_le(*marker);
            buf.put_u32_le(*entry_exit);
        }
        Request::RegisterApp => buf.put_u8(tag::REGISTER_APP),
        Request::ExitApp { exit_status } => {
            buf.put_u8(tag::EXIT_APP);
            buf.put_u32_le(*exit_status);
        }
        Request::SendEvent {
            event_id,
            event_type,
            text,
        } => {
            buf.put_u8(tag::SEND_EVENT);
            buf.put_u16_le(*event_id);
            buf.put_u16_le(*event_type);
            put_string(&mut buf, text);
        }
        Request::SendEventWithOriginator {
            event_id,
            event_type,
            originator,
            text,
        } => {
            buf.put_u8(tag::SEND_EVENT_WITH_ORIGINATOR);
            buf.put_u16_le(*event_id);
            buf.put_u16_le(*event_type);
            buf.put_u32_le(*originator);
            put_string(&mut buf, text);
        }
        Request::SendTimedEvent {
            time,
            event_id,
            event_type,
            text,
        } => {
            buf.put_u8(tag::SEND_TIMED_EVENT);
            put_systime(&mut buf, *time);
            buf.put_u16_le(*event_id);
            buf.put_u16_le(*event_type);
            put_string(&mut buf, text);
        }
        Request::RegisterFilters {
            declared_count,
            scheme,
            filters,
        } => {
            buf.put_u8(tag::REGISTER_FILTERS);
            buf.put_u16_le(*declared_count);
            buf.put_u16_le(*scheme);
            buf.put_u16_le(filters.len() as u16);
            for f in filters {
                buf.put_u16_le(f.id);
                buf.put_u16_le(f.mask);
            }
        }
        Request::ResetFilter { event_id } => {
            buf.put_u8(tag::RESET_FILTER);
            buf.put_u16_le(*event_id);
        }
        Request::ResetAllFilters => buf.put_u8(tag::RESET_ALL_FILTERS),
        Request::TimeGetCurrent => buf.put_u8(tag::TIME_GET_CURRENT),
        Request::TimeGetTai => buf.put_u8(tag::TIME_GET_TAI),
        Request::TimeGetUtc => buf.put_u8(tag::TIME_GET_UTC),
        Request::TimeConvertMetToSpacecraft { met } => {
            buf.put_u8(tag::TIME_CONVERT_MET_TO_SPACECRAFT);
            put_systime(&mut buf, *met);
        }
        Request::TimeGetStcf => buf.put_u8(tag::TIME_GET_STCF),
        Request::TimeGetMet => buf.put_u8(tag::TIME_GET_MET),
        Request::TimeGetMetSeconds => buf.put_u8(tag::TIME_GET_MET_SECONDS),
        Request::TimeGetMetSubseconds => buf.put_u8(tag::TIME_GET_MET_SUBSECONDS),
        Request::TimeGetLeapSeconds => buf.put_u8(tag::TIME_GET_LEAP_SECONDS),
        Request::TimeGetClockState => buf.put_u8(tag::TIME_GET_CLOCK_STATE),
        Request::TimeGetClockInfo => buf.put_u8(tag::TIME_GET_CLOCK_INFO),
    }
    buf.freeze()
}

/// Encode one response frame: return-value slot, then output slot.
pub fn encode_response(response: &Response) -> Bytes {
    let mut buf = BytesMut::with_capacity(24);
    put_ret(&mut buf, &response.retval);
    put_ret(&mut buf, &response.output);
    buf.freeze()
}

/// Decode one response frame (peer side of the channel).
pub fn decode_response(frame: &[u8]) -> Result<Response, DecodeError> {
    let mut r = Reader(frame);
    let retval = read_ret(&mut r)?;
    let output = read_ret(&mut r)?;
    Ok(Response { retval, output })
}
