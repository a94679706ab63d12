//! Synthetic telemetry generation.

use rand::Rng;

/// Default number of samples per generation batch.
pub const DEFAULT_SAMPLE_COUNT: usize = 10;

/// Default number of distinct machines to spread samples across.
pub const DEFAULT_MACHINE_COUNT: usize = 3;

/// Runtime above which a synthetic sample is marked slow.
const SLOW_RUNTIME_MINUTES: f64 = 100.0;

/// Generate raw ingestion payloads for `count` samples spread round-robin
/// across `machines` machine ids.
///
/// Runtimes are uniform in `[0, 150)` so roughly a third of samples land in
/// the slow band, enough to exercise the detection rules on every run.
pub fn generate(count: usize, machines: usize) -> Vec<serde_json::Value> {
    let machines = machines.max(1);
    let mut rng = rand::rng();

    (0..count)
        .map(|i| {
            let runtime: f64 = rng.random_range(0.0..150.0);
            let status = if runtime > SLOW_RUNTIME_MINUTES {
                "slow"
            } else {
                "normal"
            };

            serde_json::json!({
                "machineId": format!("M-{}", i % machines),
                "timestamp": chrono::Utc::now().timestamp_millis(),
                "runtime": runtime,
                "downtime": 0.0,
                "productionCount": 1,
                "status": status,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_count_across_machines() {
        let payloads = generate(9, 3);
        assert_eq!(payloads.len(), 9);

        for (i, payload) in payloads.iter().enumerate() {
            assert_eq!(payload["machineId"], format!("M-{}", i % 3));
            let runtime = payload["runtime"].as_f64().unwrap();
            assert!((0.0..150.0).contains(&runtime));
            assert!(payload["timestamp"].as_i64().unwrap() > 0);
        }
    }

    #[test]
    fn status_tracks_the_slow_band() {
        for payload in generate(50, DEFAULT_MACHINE_COUNT) {
            let runtime = payload["runtime"].as_f64().unwrap();
            let expected = if runtime > SLOW_RUNTIME_MINUTES {
                "slow"
            } else {
                "normal"
            };
            assert_eq!(payload["status"], expected);
        }
    }

    #[test]
    fn zero_machines_falls_back_to_one() {
        let payloads = generate(3, 0);
        assert!(payloads.iter().all(|p| p["machineId"] == "M-0"));
    }
}
