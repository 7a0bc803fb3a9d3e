//! Property tests for scheduler timing.

use proptest::prelude::*;
use tabletop_core::SimTick;
use tabletop_scripting::Step;
use tabletop_testkit::{FireLog, TickHarness};

proptest! {
    /// Property: frames(n) fires exactly once, on tick max(n, 1).
    #[test]
    fn frames_fire_once_on_the_expected_tick(n in 0_i64..200, offset in 0_u64..20) {
        let mut harness = TickHarness::new(0.05);
        harness.run(offset);
        let log = FireLog::new(harness.wait());
        harness.wait().frames(log.recorder("f"), n).unwrap();

        harness.run(n.max(1) as u64 + 10);

        let expected = SimTick(offset + n.max(1) as u64);
        prop_assert_eq!(log.ticks_of("f"), vec![expected]);
        prop_assert_eq!(harness.wait().pending_count(), 0);
    }

    /// Property: a one-shot delay fires on the first tick whose cumulative
    /// elapsed time reaches it, never earlier.
    #[test]
    fn delay_fires_on_the_first_tick_reaching_it(
        quarters in prop::collection::vec(1_u32..8, 1..40),
        target_index in 0_usize..40,
    ) {
        // Multiples of 0.25 are exact in binary floating point.
        let deltas: Vec<f64> = quarters.iter().map(|q| f64::from(*q) * 0.25).collect();
        let k = target_index % deltas.len();
        let delay: f64 = deltas[..=k].iter().sum();

        let mut harness = TickHarness::new(0.0);
        harness.clock_mut().queue_all(deltas.iter().copied());
        let log = FireLog::new(harness.wait());
        harness.wait().time(log.recorder("t"), delay, 1).unwrap();

        harness.run(deltas.len() as u64);

        prop_assert_eq!(log.ticks_of("t"), vec![SimTick(k as u64 + 1)]);
    }

    /// Property: repetitions with whole-second ticks fire once per tick, then stop.
    #[test]
    fn repetitions_are_honoured(reps in 1_i64..30) {
        let mut harness = TickHarness::new(1.0);
        let log = FireLog::new(harness.wait());
        let id = harness.wait().time(log.recorder("r"), 1.0, reps).unwrap();

        harness.run(reps as u64 + 5);

        prop_assert_eq!(log.count("r"), reps as usize);
        prop_assert!(!harness.wait().is_pending(id));
    }

    /// Property: stopping any subset of tasks before they fire suppresses
    /// exactly that subset.
    #[test]
    fn stopped_tasks_never_fire(
        specs in prop::collection::vec((0_u8..3, 1_i64..10, any::<bool>()), 1..30),
    ) {
        let mut harness = TickHarness::new(0.5);
        let log = FireLog::new(harness.wait());
        let mut expected = Vec::new();
        for (index, (kind, amount, stop)) in specs.iter().enumerate() {
            let label = format!("task{index}");
            let wait = harness.wait();
            let id = match *kind {
                0 => wait.frames(log.recorder(&label), *amount).unwrap(),
                1 => wait.time(log.recorder(&label), *amount as f64 * 0.5, 1).unwrap(),
                _ => {
                    let mut remaining = *amount;
                    let mut record = log.recorder(&label);
                    wait.coroutine(move || {
                        remaining -= 1;
                        if remaining == 0 {
                            record();
                            Step::Complete
                        } else {
                            Step::Yield
                        }
                    })
                }
            };
            if *stop {
                prop_assert!(wait.stop(id));
            } else {
                expected.push(label);
            }
        }

        harness.run(20);

        let mut fired = log.labels();
        fired.sort();
        expected.sort();
        prop_assert_eq!(fired, expected);
        prop_assert_eq!(harness.wait().pending_count(), 0);
    }
}
