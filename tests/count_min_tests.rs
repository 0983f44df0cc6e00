use hardened_bloom_rs::{
    CountMinSketch, EncodingFilter, FilterConfigBuilder, FilterError,
    FilterKind, HashStrategy, Label, SimilarityMode,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn sketch(width: usize, rows: usize) -> CountMinSketch {
    CountMinSketch::new(width, rows, HashStrategy::Unkeyed).unwrap()
}

fn test_sketch() -> CountMinSketch {
    let mut s = sketch(30, 1);
    s.insert("test").unwrap();
    s.insert("test").unwrap();
    s.insert("test2").unwrap();
    s
}

#[cfg(test)]
mod estimate_tests {
    use super::*;

    #[test]
    fn test_estimates_follow_insert_counts() {
        for s in [test_sketch(), test_sketch()] {
            assert_eq!(s.estimate("test").unwrap(), 2);
            assert_eq!(s.estimate("test2").unwrap(), 1);
            assert_eq!(s.estimate("unseen").unwrap(), 0);
            assert!(s.contains("test").unwrap());
            assert!(!s.contains("unseen").unwrap());
        }
    }

    #[test]
    fn test_columns_per_row() {
        let mut s = sketch(30, 3);
        assert_eq!(s.insert("test2").unwrap(), vec![9, 25, 27]);
        assert_eq!(s.estimate("test2").unwrap(), 1);
        assert_eq!(s.counters()[9], 1);
        assert_eq!(s.counters()[30 + 25], 1);
        assert_eq!(s.counters()[60 + 27], 1);
    }

    #[test]
    fn test_estimate_takes_row_minimum() {
        // "test2" and "b" share column 9 in the first row only
        let mut s = sketch(30, 3);
        s.insert("test2").unwrap();
        s.insert("b").unwrap();
        assert_eq!(s.counters()[9], 2);
        assert_eq!(s.estimate("test2").unwrap(), 1);
    }

    #[test]
    fn test_keyed_sketch_counts() {
        let mut s =
            CountMinSketch::new(64, 3, HashStrategy::keyed("crypt_key")).unwrap();
        for _ in 0..4 {
            s.insert("dings").unwrap();
        }
        assert_eq!(s.estimate("dings").unwrap(), 4);
        assert_eq!(s.max_counter(), 4);
    }

    #[test]
    fn test_counters_wrap_at_sixteen_bits() {
        let mut s = CountMinSketch::from_payload(
            &i16::MAX.to_le_bytes(),
            Label::Unknown,
            1,
            HashStrategy::Unkeyed,
        )
        .unwrap();
        assert_eq!(s.width(), 1);
        s.insert("anything").unwrap();
        assert_eq!(s.counters(), &[i16::MIN]);
    }
}

#[cfg(test)]
mod serialization_tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_config() {
        let mut original = test_sketch();
        original.set_label(Label::Benign);
        let line = original.to_line();

        let config = FilterConfigBuilder::default()
            .kind(FilterKind::CountMin)
            .size(30)
            .num_hashes(1)
            .build()
            .unwrap();
        let restored = config.decode_line(&line).unwrap();
        let restored = restored.as_count_min().unwrap();
        assert_eq!(restored.width(), 30);
        assert_eq!(restored.rows(), 1);
        assert_eq!(restored.label(), Label::Benign);
        assert_eq!(restored.estimate("test").unwrap(), 2);
        assert_eq!(restored, &original);
    }

    #[test]
    fn test_decode_needs_configured_width_and_rows() {
        let s = sketch(10, 3);
        let config = |size, rows| {
            FilterConfigBuilder::default()
                .kind(FilterKind::CountMin)
                .size(size)
                .num_hashes(rows)
                .build()
                .unwrap()
        };
        let restored = config(10, 3).decode_line(&s.to_line()).unwrap();
        assert_eq!(restored.as_count_min().unwrap().width(), 10);

        for (size, rows) in [(10, 4), (12, 3), (10, 2), (1024, 3)] {
            assert!(matches!(
                config(size, rows).decode_line(&s.to_line()),
                Err(FilterError::MalformedRecord(_))
            ));
        }
    }

    #[test]
    fn test_libsvm_vector_keeps_counts() {
        let s = test_sketch();
        assert_eq!(s.to_libsvm(), "0 10:1 27:2");
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;

    #[test]
    fn test_merge_takes_counter_maximum() {
        let mut a = test_sketch();
        let mut b = sketch(30, 1);
        for _ in 0..3 {
            b.insert("test2").unwrap();
        }
        b.insert("test").unwrap();
        b.set_label(Label::Fraud);

        a.merge(&b).unwrap();
        assert_eq!(a.estimate("test").unwrap(), 2);
        assert_eq!(a.estimate("test2").unwrap(), 3);
        assert_eq!(a.label(), Label::Fraud);
    }

    #[test]
    fn test_merge_rejects_other_shapes() {
        let mut a = sketch(30, 1);
        let b = sketch(10, 3);
        assert!(matches!(
            a.merge(&b),
            Err(FilterError::SizeMismatch { .. })
        ));
    }
}

#[cfg(test)]
mod similarity_tests {
    use super::*;

    #[test]
    fn test_jaccard_over_non_zero_cells() {
        let a = test_sketch();
        let mut b = sketch(30, 1);
        b.insert("test").unwrap();
        // a uses columns 9 and 26, b only 26
        assert_eq!(a.similarity(&b, SimilarityMode::Jaccard).unwrap(), 0.5);
    }

    #[test]
    fn test_simple_mode_compares_value_sets() {
        let mut a = sketch(30, 1);
        a.insert("test").unwrap();
        a.insert("test").unwrap();
        let mut b = sketch(30, 1);
        b.insert("test2").unwrap();
        b.insert("test2").unwrap();
        // different columns, same values {0, 2}
        assert_eq!(a.similarity(&b, SimilarityMode::Simple).unwrap(), 0.0);
        assert_eq!(a.similarity(&b, SimilarityMode::Jaccard).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_sketches_count_as_distant() {
        let a = sketch(30, 1);
        let b = sketch(30, 1);
        assert_eq!(a.similarity(&b, SimilarityMode::Jaccard).unwrap(), 1.0);
        assert_eq!(a.similarity(&b, SimilarityMode::Simple).unwrap(), 1.0);
    }
}

#[cfg(test)]
mod noise_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_noise_keeps_estimates() {
        let mut s = test_sketch();
        s.fill_with_noise(60.0, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(s.fill_level(), 60.0);
        assert!(s.estimate("test").unwrap() >= 2);
        assert!(s.estimate("test2").unwrap() >= 1);
        assert!(s.max_counter() <= 2);
    }

    proptest! {
        #[test]
        fn noise_never_lowers_a_counter(
            tokens in prop::collection::vec("[a-z]{1,6}", 0..40),
            noise in 0.0f64..=100.0,
            seed in any::<u64>(),
        ) {
            let mut before = sketch(50, 2);
            for token in &tokens {
                before.insert(token).unwrap();
            }
            let mut after = before.clone();
            after.fill_with_noise(noise, &mut StdRng::seed_from_u64(seed)).unwrap();
            prop_assert_eq!(after.size(), before.size());
            for (now, was) in after.counters().iter().zip(before.counters()) {
                prop_assert!(now >= was);
            }
            for token in &tokens {
                let now = after.estimate(token).unwrap();
                prop_assert!(now >= before.estimate(token).unwrap());
            }
        }

        #[test]
        fn merge_is_commutative(
            left in prop::collection::vec("[a-z]{1,6}", 0..20),
            right in prop::collection::vec("[a-z]{1,6}", 0..20),
        ) {
            let fill = |tokens: &[String]| {
                let mut s = sketch(40, 2);
                for token in tokens {
                    s.insert(token).unwrap();
                }
                s
            };
            let mut ab = fill(&left);
            ab.merge(&fill(&right)).unwrap();
            let mut ba = fill(&right);
            ba.merge(&fill(&left)).unwrap();
            prop_assert_eq!(ab.counters(), ba.counters());
        }
    }
}
