//! Property-based tests against the kernel
//!
//! Arbitrary splits of the input must not change the digest, in either
//! write mode.

use algsock::{Config, Connection, WriteMode};
use algsock_integration_tests::dial;
use proptest::prelude::*;
use std::io::Write;
use std::sync::OnceLock;

fn connection(mode: WriteMode) -> Option<&'static Connection> {
    static SPLICE: OnceLock<Option<Connection>> = OnceLock::new();
    static SEND: OnceLock<Option<Connection>> = OnceLock::new();

    let (cell, config) = match mode {
        WriteMode::Splice => (&SPLICE, Config::default()),
        WriteMode::Send => (
            &SEND,
            Config {
                write_mode: WriteMode::Send,
                ..Default::default()
            },
        ),
    };
    cell.get_or_init(|| dial("sha256", Some(&config))).as_ref()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_split_points_do_not_matter(
        data in prop::collection::vec(any::<u8>(), 0..20_000),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        send in any::<bool>(),
    ) {
        let mode = if send { WriteMode::Send } else { WriteMode::Splice };
        let Some(conn) = connection(mode) else {
            return Ok(());
        };

        let mut whole = conn.session().unwrap();
        whole.write_all(&data).unwrap();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(data.len() + 1)).collect();
        points.sort_unstable();
        let mut split = conn.session().unwrap();
        let mut start = 0;
        for point in points.into_iter().chain([data.len()]) {
            prop_assert_eq!(split.write_more(&data[start..point]).unwrap(), point - start);
            start = point;
        }

        prop_assert_eq!(whole.finalize().unwrap(), split.finalize().unwrap());
    }
}
