//! Envelope types for child-to-host RPC.
//!
//! One request envelope carries exactly one proxied host operation; most
//! operations produce exactly one response envelope. The request tag set is
//! fixed and closed: adding an operation means adding a variant here, and the
//! exhaustive matches in the codec and dispatch table then refuse to compile
//! until it is handled everywhere.

/// Host executive time value: whole seconds plus a binary subsecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SysTime {
    pub seconds: u32,
    pub subseconds: u32,
}

impl SysTime {
    pub fn new(seconds: u32, subseconds: u32) -> Self {
        Self {
            seconds,
            subseconds,
        }
    }
}

/// One event-filter registration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub id: u16,
    pub mask: u16,
}

/// A proxied host operation, decoded from one request envelope.
///
/// The two "alternate clock base" time queries are TAI and UTC.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Cooperative run-status poll. Carries the caller's current status value;
    /// see [`Response::output`] for why the mutated value stays host-side.
    RunLoop { exit_status: u32 },
    /// Performance marker entry/exit. Fire-and-forget: no reply envelope.
    PerfLogAdd { marker: u32, entry_exit: u32 },
    /// Child-side registration attempt. The bridge registers on the child's
    /// behalf at startup, so this is rejected with a fixed `0`.
    RegisterApp,
    /// Graceful exit request. The bridge tears down instead of replying.
    ExitApp { exit_status: u32 },
    SendEvent {
        event_id: u16,
        event_type: u16,
        text: String,
    },
    SendEventWithOriginator {
        event_id: u16,
        event_type: u16,
        originator: u32,
        text: String,
    },
    SendTimedEvent {
        time: SysTime,
        event_id: u16,
        event_type: u16,
        text: String,
    },
    /// The declared count and the element count may legitimately differ;
    /// both pass through to the host as given.
    RegisterFilters {
        declared_count: u16,
        scheme: u16,
        filters: Vec<EventFilter>,
    },
    ResetFilter { event_id: u16 },
    ResetAllFilters,
    TimeGetCurrent,
    TimeGetTai,
    TimeGetUtc,
    TimeConvertMetToSpacecraft { met: SysTime },
    TimeGetStcf,
    TimeGetMet,
    TimeGetMetSeconds,
    TimeGetMetSubseconds,
    TimeGetLeapSeconds,
    TimeGetClockState,
    TimeGetClockInfo,
}

/// Width/type a reply value is declared to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetKind {
    Void,
    Int32,
    UInt32,
    Int16,
    UInt16,
    Time,
}

/// A typed reply value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetValue {
    Void,
    Int32(i32),
    UInt32(u32),
    Int16(i16),
    UInt16(u16),
    Time(SysTime),
}

impl RetValue {
    pub fn kind(&self) -> RetKind {
        match self {
            Self::Void => RetKind::Void,
            Self::Int32(_) => RetKind::Int32,
            Self::UInt32(_) => RetKind::UInt32,
            Self::Int16(_) => RetKind::Int16,
            Self::UInt16(_) => RetKind::UInt16,
            Self::Time(_) => RetKind::Time,
        }
    }
}

/// One response envelope.
///
/// `output` is the side-slot reserved for operations whose original signature
/// passes a value by mutable reference. The current operations never populate
/// it — it stays [`RetValue::Void`] on the wire so the format can carry such
/// a value later without a layout break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub retval: RetValue,
    pub output: RetValue,
}

impl Response {
    /// Response carrying only a return value, with an empty output slot.
    pub fn retval(retval: RetValue) -> Self {
        Self {
            retval,
            output: RetValue::Void,
        }
    }
}

impl Request {
    /// The reply kind this operation is declared to produce, or `None` for
    /// the operations that send no response envelope at all.
    pub fn reply_kind(&self) -> Option<RetKind> {
        match self {
            Self::RunLoop { .. } => Some(RetKind::Int32),
            Self::PerfLogAdd { .. } => None,
            Self::RegisterApp => Some(RetKind::Int32),
            Self::ExitApp { .. } => None,
            Self::SendEvent { .. }
            | Self::SendEventWithOriginator { .. }
            | Self::SendTimedEvent { .. }
            | Self::RegisterFilters { .. }
            | Self::ResetFilter { .. }
            | Self::ResetAllFilters => Some(RetKind::Int32),
            Self::TimeGetCurrent
            | Self::TimeGetTai
            | Self::TimeGetUtc
            | Self::TimeConvertMetToSpacecraft { .. }
            | Self::TimeGetStcf
            | Self::TimeGetMet => Some(RetKind::Time),
            Self::TimeGetMetSeconds | Self::TimeGetMetSubseconds => Some(RetKind::UInt32),
            Self::TimeGetLeapSeconds | Self::TimeGetClockState => Some(RetKind::Int16),
            Self::TimeGetClockInfo => Some(RetKind::UInt16),
        }
    }

    /// Operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunLoop { .. } => "RunLoop",
            Self::PerfLogAdd { .. } => "PerfLogAdd",
            Self::RegisterApp => "RegisterApp",
            Self::ExitApp { .. } => "ExitApp",
            Self::SendEvent { .. } => "SendEvent",
            Self::SendEventWithOriginator { .. } => "SendEventWithOriginator",
            Self::SendTimedEvent { .. } => "SendTimedEvent",
            Self::RegisterFilters { .. } => "RegisterFilters",
            Self::ResetFilter { .. } => "ResetFilter",
            Self::ResetAllFilters => "ResetAllFilters",
            Self::TimeGetCurrent => "TimeGetCurrent",
            Self::TimeGetTai => "TimeGetTai",
            Self::TimeGetUtc => "TimeGetUtc",
            Self::TimeConvertMetToSpacecraft { .. } => "TimeConvertMetToSpacecraft",
            Self::TimeGetStcf => "TimeGetStcf",
            Self::TimeGetMet => "TimeGetMet",
            Self::TimeGetMetSeconds => "TimeGetMetSeconds",
            Self::TimeGetMetSubseconds => "TimeGetMetSubseconds",
            Self::TimeGetLeapSeconds => "TimeGetLeapSeconds",
            Self::TimeGetClockState => "TimeGetClockState",
            Self::TimeGetClockInfo => "TimeGetClockInfo",
        }
    }
}
