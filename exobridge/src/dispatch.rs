//! Dispatch table: one decoded request in, at most one response out.
//!
//! The match below is exhaustive over the request set, so every operation is
//! routed to exactly one host service call. Two outcomes break the
//! one-request-one-response shape: fire-and-forget markers produce no reply,
//! and a graceful exit request tears the bridge down instead of replying.

use crate::bridge::protocol::{Request, Response, RetValue};
use crate::services::HostServices;
use crate::telemetry::{ChildRunState, TelemetryState};

/// What one dispatched request asks the run loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Send this response envelope back to the child.
    Reply(Response),
    /// Fire-and-forget operation; nothing goes back.
    NoReply,
    /// The child asked to exit with this status; shut the bridge down.
    Terminate(u32),
}

/// Route one request to its host service call.
pub fn dispatch(
    request: Request,
    services: &mut HostServices,
    telemetry: &mut TelemetryState,
) -> DispatchOutcome {
    tracing::debug!(op = request.name(), "dispatching");

    let retval = match request {
        Request::RunLoop { exit_status } => {
            let mut run_status = exit_status;
            let keep_running = services.executive.run_loop(&mut run_status);
            // The child only consumes the boolean; the rewritten status value
            // stays host-side (the response output slot is reserved, unused).
            RetValue::Int32(keep_running as i32)
        }
        Request::PerfLogAdd { marker, entry_exit } => {
            services.executive.perf_log_add(marker, entry_exit);
            return DispatchOutcome::NoReply;
        }
        Request::RegisterApp => {
            // Registration already happened on the child's behalf at startup;
            // a second attempt from inside the child is refused.
            tracing::warn!("child attempted its own registration");
            RetValue::Int32(0)
        }
        Request::ExitApp { exit_status } => {
            telemetry.set_child_state(ChildRunState::Exited);
            tracing::info!(exit_status, "child requested exit");
            return DispatchOutcome::Terminate(exit_status);
        }
        Request::SendEvent {
            event_id,
            event_type,
            text,
        } => RetValue::Int32(services.events.send_event(event_id, event_type, &text)),
        Request::SendEventWithOriginator {
            event_id,
            event_type,
            originator,
            text,
        } => RetValue::Int32(
            services
                .events
                .send_event_with_origin(event_id, event_type, originator, &text),
        ),
        Request::SendTimedEvent {
            time,
            event_id,
            event_type,
            text,
        } => RetValue::Int32(
            services
                .events
                .send_timed_event(time, event_id, event_type, &text),
        ),
        Request::RegisterFilters {
            declared_count,
            scheme,
            filters,
        } => RetValue::Int32(
            services
                .events
                .register_filters(&filters, declared_count, scheme),
        ),
        Request::ResetFilter { event_id } => {
            RetValue::Int32(services.events.reset_filter(event_id))
        }
        Request::ResetAllFilters => RetValue::Int32(services.events.reset_all_filters()),
        Request::TimeGetCurrent => RetValue::Time(services.time.current()),
        Request::TimeGetTai => RetValue::Time(services.time.tai()),
        Request::TimeGetUtc => RetValue::Time(services.time.utc()),
        Request::TimeConvertMetToSpacecraft { met } => {
            RetValue::Time(services.time.met_to_spacecraft(met))
        }
        Request::TimeGetStcf => RetValue::Time(services.time.stcf()),
        Request::TimeGetMet => RetValue::Time(services.time.met()),
        Request::TimeGetMetSeconds => RetValue::UInt32(services.time.met_seconds()),
        Request::TimeGetMetSubseconds => RetValue::UInt32(services.time.met_subseconds()),
        Request::TimeGetLeapSeconds => RetValue::Int16(services.time.leap_seconds()),
        Request::TimeGetClockState => RetValue::Int16(services.time.clock_state()),
        Request::TimeGetClockInfo => RetValue::UInt16(services.time.clock_info()),
    };

    DispatchOutcome::Reply(Response::retval(retval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{EventFilter, RetKind, SysTime};
    use crate::services::{EventServices, ExecutiveServices, TelemetrySink, TimeServices};

    struct FakeExecutive {
        keep_running: bool,
    }

    impl ExecutiveServices for FakeExecutive {
        fn register_app(&mut self) -> i32 {
            0
        }

        fn run_loop(&mut self, run_status: &mut u32) -> bool {
            *run_status = 99;
            self.keep_running
        }

        fn perf_log_add(&mut self, _marker: u32, _entry_exit: u32) {}

        fn exit_app(&mut self, _run_status: u32) {}
    }

    struct FakeEvents;

    impl EventServices for FakeEvents {
        fn send_event(&mut self, _event_id: u16, _event_type: u16, _text: &str) -> i32 {
            0
        }

        fn send_event_with_origin(
            &mut self,
            _event_id: u16,
            _event_type: u16,
            _originator: u32,
            _text: &str,
        ) -> i32 {
            0
        }

        fn send_timed_event(
            &mut self,
            _time: SysTime,
            _event_id: u16,
            _event_type: u16,
            _text: &str,
        ) -> i32 {
            0
        }

        fn register_filters(
            &mut self,
            _filters: &[EventFilter],
            _declared_count: u16,
            _scheme: u16,
        ) -> i32 {
            0
        }

        fn reset_filter(&mut self, _event_id: u16) -> i32 {
            -7
        }

        fn reset_all_filters(&mut self) -> i32 {
            0
        }
    }

    struct FakeTime;

    impl TimeServices for FakeTime {
        fn current(&mut self) -> SysTime {
            SysTime::new(100, 1)
        }
        fn tai(&mut self) -> SysTime {
            SysTime::new(100, 2)
        }
        fn utc(&mut self) -> SysTime {
            SysTime::new(100, 3)
        }
        fn met(&mut self) -> SysTime {
            SysTime::new(100, 4)
        }
        fn stcf(&mut self) -> SysTime {
            SysTime::new(100, 5)
        }
        fn met_to_spacecraft(&mut self, met: SysTime) -> SysTime {
            SysTime::new(met.seconds + 1, met.subseconds)
        }
        fn met_seconds(&mut self) -> u32 {
            42
        }
        fn met_subseconds(&mut self) -> u32 {
            43
        }
        fn leap_seconds(&mut self) -> i16 {
            37
        }
        fn clock_state(&mut self) -> i16 {
            -1
        }
        fn clock_info(&mut self) -> u16 {
            0x8000
        }
    }

    struct NullSink;

    impl TelemetrySink for NullSink {
        fn emit(&mut self, _telemetry: &TelemetryState) {}
    }

    fn services(keep_running: bool) -> HostServices {
        HostServices {
            executive: Box::new(FakeExecutive { keep_running }),
            events: Box::new(FakeEvents),
            time: Box::new(FakeTime),
            telemetry_sink: Box::new(NullSink),
        }
    }

    fn all_requests() -> Vec<Request> {
        vec![
            Request::RunLoop { exit_status: 1 },
            Request::PerfLogAdd {
                marker: 3,
                entry_exit: 0,
            },
            Request::RegisterApp,
            Request::ExitApp { exit_status: 2 },
            Request::SendEvent {
                event_id: 1,
                event_type: 2,
                text: "e".into(),
            },
            Request::SendEventWithOriginator {
                event_id: 1,
                event_type: 2,
                originator: 88,
                text: "e".into(),
            },
            Request::SendTimedEvent {
                time: SysTime::new(5, 0),
                event_id: 1,
                event_type: 2,
                text: "e".into(),
            },
            Request::RegisterFilters {
                declared_count: 2,
                scheme: 0,
                filters: vec![EventFilter { id: 1, mask: 0xffff }],
            },
            Request::ResetFilter { event_id: 1 },
            Request::ResetAllFilters,
            Request::TimeGetCurrent,
            Request::TimeGetTai,
            Request::TimeGetUtc,
            Request::TimeConvertMetToSpacecraft {
                met: SysTime::new(9, 9),
            },
            Request::TimeGetStcf,
            Request::TimeGetMet,
            Request::TimeGetMetSeconds,
            Request::TimeGetMetSubseconds,
            Request::TimeGetLeapSeconds,
            Request::TimeGetClockState,
            Request::TimeGetClockInfo,
        ]
    }

    #[test]
    fn every_reply_matches_the_declared_kind() {
        let mut services = services(true);
        let mut telemetry = TelemetryState::new();

        for request in all_requests() {
            let declared = request.reply_kind();
            let name = request.name();
            match dispatch(request, &mut services, &mut telemetry) {
                DispatchOutcome::Reply(resp) => {
                    assert_eq!(Some(resp.retval.kind()), declared, "{name}");
                    assert_eq!(resp.output, RetValue::Void, "{name}");
                }
                DispatchOutcome::NoReply | DispatchOutcome::Terminate(_) => {
                    assert_eq!(declared, None, "{name}");
                }
            }
        }
    }

    #[test]
    fn run_loop_reports_the_executive_verdict() {
        let mut telemetry = TelemetryState::new();

        let mut go = services(true);
        let outcome = dispatch(Request::RunLoop { exit_status: 1 }, &mut go, &mut telemetry);
        assert_eq!(
            outcome,
            DispatchOutcome::Reply(Response::retval(RetValue::Int32(1)))
        );

        let mut stop = services(false);
        let outcome = dispatch(
            Request::RunLoop { exit_status: 1 },
            &mut stop,
            &mut telemetry,
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Reply(Response::retval(RetValue::Int32(0)))
        );
    }

    #[test]
    fn perf_marker_produces_no_reply() {
        let mut services = services(true);
        let mut telemetry = TelemetryState::new();
        let outcome = dispatch(
            Request::PerfLogAdd {
                marker: 7,
                entry_exit: 1,
            },
            &mut services,
            &mut telemetry,
        );
        assert_eq!(outcome, DispatchOutcome::NoReply);
    }

    #[test]
    fn exit_app_terminates_and_marks_the_child_exited() {
        let mut services = services(true);
        let mut telemetry = TelemetryState::new();
        let outcome = dispatch(
            Request::ExitApp { exit_status: 3 },
            &mut services,
            &mut telemetry,
        );
        assert_eq!(outcome, DispatchOutcome::Terminate(3));
        assert_eq!(telemetry.child_run_state(), ChildRunState::Exited);
    }

    #[test]
    fn second_registration_is_refused_with_zero() {
        let mut services = services(true);
        let mut telemetry = TelemetryState::new();
        let outcome = dispatch(Request::RegisterApp, &mut services, &mut telemetry);
        assert_eq!(
            outcome,
            DispatchOutcome::Reply(Response::retval(RetValue::Int32(0)))
        );
    }

    #[test]
    fn filter_counts_pass_through_unreconciled() {
        use std::sync::{Arc, Mutex};

        struct RecordingEvents(Arc<Mutex<Option<(u16, u16, usize)>>>);

        impl EventServices for RecordingEvents {
            fn send_event(&mut self, _id: u16, _ty: u16, _text: &str) -> i32 {
                0
            }
            fn send_event_with_origin(
                &mut self,
                _id: u16,
                _ty: u16,
                _origin: u32,
                _text: &str,
            ) -> i32 {
                0
            }
            fn send_timed_event(&mut self, _t: SysTime, _id: u16, _ty: u16, _text: &str) -> i32 {
                0
            }
            fn register_filters(
                &mut self,
                filters: &[EventFilter],
                declared_count: u16,
                scheme: u16,
            ) -> i32 {
                *self.0.lock().unwrap() = Some((declared_count, scheme, filters.len()));
                0
            }
            fn reset_filter(&mut self, _id: u16) -> i32 {
                0
            }
            fn reset_all_filters(&mut self) -> i32 {
                0
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let mut services = services(true);
        services.events = Box::new(RecordingEvents(seen.clone()));
        let mut telemetry = TelemetryState::new();

        dispatch(
            Request::RegisterFilters {
                declared_count: 4,
                scheme: 0,
                filters: vec![EventFilter { id: 9, mask: 3 }],
            },
            &mut services,
            &mut telemetry,
        );
        // Declared count 4 with one element: both handed over as-is.
        assert_eq!(*seen.lock().unwrap(), Some((4, 0, 1)));
    }

    #[test]
    fn reset_filter_then_reset_all_clears_every_filter() {
        use std::collections::HashMap;
        use std::sync::{Arc, Mutex};

        // Filter state modeled as per-id event counts; a reset zeroes them.
        struct StatefulEvents(Arc<Mutex<HashMap<u16, u32>>>);

        impl EventServices for StatefulEvents {
            fn send_event(&mut self, event_id: u16, _ty: u16, _text: &str) -> i32 {
                *self.0.lock().unwrap().entry(event_id).or_insert(0) += 1;
                0
            }
            fn send_event_with_origin(&mut self, _id: u16, _ty: u16, _o: u32, _text: &str) -> i32 {
                0
            }
            fn send_timed_event(&mut self, _t: SysTime, _id: u16, _ty: u16, _text: &str) -> i32 {
                0
            }
            fn register_filters(
                &mut self,
                filters: &[EventFilter],
                _declared_count: u16,
                _scheme: u16,
            ) -> i32 {
                let mut state = self.0.lock().unwrap();
                for f in filters {
                    state.insert(f.id, 0);
                }
                0
            }
            fn reset_filter(&mut self, event_id: u16) -> i32 {
                match self.0.lock().unwrap().get_mut(&event_id) {
                    Some(count) => {
                        *count = 0;
                        0
                    }
                    None => -1,
                }
            }
            fn reset_all_filters(&mut self) -> i32 {
                for count in self.0.lock().unwrap().values_mut() {
                    *count = 0;
                }
                0
            }
        }

        let state = Arc::new(Mutex::new(HashMap::new()));
        let mut services = services(true);
        services.events = Box::new(StatefulEvents(state.clone()));
        let mut telemetry = TelemetryState::new();

        dispatch(
            Request::RegisterFilters {
                declared_count: 2,
                scheme: 0,
                filters: vec![
                    EventFilter { id: 7, mask: 0xffff },
                    EventFilter { id: 9, mask: 0xffff },
                ],
            },
            &mut services,
            &mut telemetry,
        );
        for id in [7, 7, 9] {
            dispatch(
                Request::SendEvent {
                    event_id: id,
                    event_type: 2,
                    text: "tick".into(),
                },
                &mut services,
                &mut telemetry,
            );
        }
        assert_eq!(state.lock().unwrap()[&7], 2);
        assert_eq!(state.lock().unwrap()[&9], 1);

        let outcome = dispatch(
            Request::ResetFilter { event_id: 7 },
            &mut services,
            &mut telemetry,
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Reply(Response::retval(RetValue::Int32(0)))
        );
        assert_eq!(state.lock().unwrap()[&7], 0);
        assert_eq!(state.lock().unwrap()[&9], 1);

        dispatch(Request::ResetAllFilters, &mut services, &mut telemetry);
        assert!(state.lock().unwrap().values().all(|&count| count == 0));
    }

    #[test]
    fn met_conversion_carries_the_operand() {
        let mut services = services(true);
        let mut telemetry = TelemetryState::new();
        let outcome = dispatch(
            Request::TimeConvertMetToSpacecraft {
                met: SysTime::new(10, 7),
            },
            &mut services,
            &mut telemetry,
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Reply(Response::retval(RetValue::Time(SysTime::new(11, 7))))
        );
    }

}
