#![no_main]

use libfuzzer_sys::fuzz_target;
use monitoverse_stream::{MetricKind, MetricStream, DISK_MOUNT_KEYS, METRIC_WINDOW_CAPACITY};

fuzz_target!(|data: &[u8]| {
    for kind in MetricKind::ALL {
        let mut stream = MetricStream::new(kind);
        for chunk in data.split(|byte| *byte == b'\n') {
            let before = stream.samples().latest().map(|sample| sample.sequence_index);
            match stream.apply_bytes(chunk) {
                Ok(sample) => {
                    assert_eq!(sample.sequence_index, before.map_or(0, |index| index + 1));
                    if kind == MetricKind::Disk {
                        for mount in DISK_MOUNT_KEYS {
                            assert!(sample.value.mount(mount).is_some());
                        }
                    } else {
                        assert!(sample.value.gauge().is_some());
                    }
                }
                Err(_) => {
                    assert_eq!(
                        stream.samples().latest().map(|sample| sample.sequence_index),
                        before
                    );
                }
            }
            assert!(stream.samples().len() <= METRIC_WINDOW_CAPACITY);
        }
    }
});
