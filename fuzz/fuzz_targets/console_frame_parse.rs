#![no_main]

use libfuzzer_sys::fuzz_target;
use monitoverse_console::{decode_console_frame, ConsoleState, ConsoleUpdate};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(frame) = decode_console_frame(&raw) else {
        return;
    };

    let mut state = ConsoleState::new();
    state.mark_open();
    let history_before = state.history.len();
    match state.apply_frame(frame) {
        ConsoleUpdate::Finished(_) | ConsoleUpdate::Failed(_) => {
            assert_eq!(state.history.len(), history_before + 1);
            assert!(state.in_flight.is_none());
        }
        ConsoleUpdate::Progress(_) => assert!(state.in_flight.is_some()),
        ConsoleUpdate::HistoryReplaced { entries } => assert_eq!(state.history.len(), entries),
        ConsoleUpdate::Ignored => assert_eq!(state.history.len(), history_before),
    }
});
