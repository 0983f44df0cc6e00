//! Export of serialized filters as LIBSVM feature vectors.
use crate::config::FilterConfig;
use crate::error::Result;
use crate::filter::EncodingFilter;
use crate::record::record_lines;
use std::io::{BufRead, Write};
use tracing::{info, warn};

/// Writes one LIBSVM line per decodable record and returns how many were
/// written. Malformed records are skipped with a warning.
pub fn convert_to_libsvm<R: BufRead, W: Write>(
    config: &FilterConfig,
    input: R,
    mut output: W,
) -> Result<usize> {
    let mut written = 0;
    for (idx, line) in record_lines(input).enumerate() {
        match line.and_then(|line| config.decode_line(&line)) {
            Ok(filter) => {
                writeln!(output, "{}", filter.to_libsvm())?;
                written += 1;
            }
            Err(e) if e.is_recoverable() => {
                warn!(line = idx + 1, "Skipping record: {}", e);
            }
            Err(e) => return Err(e),
        }
    }
    output.flush()?;
    info!(written, "LIBSVM export finished");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterConfigBuilder, FilterKind};

    #[test]
    fn test_bloom_records_become_bit_indices() {
        let config = FilterConfigBuilder::default().size(24).build().unwrap();
        let mut out = Vec::new();
        let written =
            convert_to_libsvm(&config, "1\tAAAc\nbroken\n".as_bytes(), &mut out)
                .unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "1 19:1 20:1 21:1\n");
    }

    #[test]
    fn test_sketch_records_keep_counts() {
        let config = FilterConfigBuilder::default()
            .kind(FilterKind::CountMin)
            .size(4)
            .num_hashes(1)
            .build()
            .unwrap();
        // counters [0, 2, 0, 1]
        let mut out = Vec::new();
        convert_to_libsvm(&config, "-1\tAAACAAAAAQA=\n".as_bytes(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "-1 2:2 4:1\n");
    }

    #[test]
    fn test_wrong_sized_and_undecodable_lines_are_skipped() {
        let config = FilterConfigBuilder::default().size(24).build().unwrap();
        let input: &[u8] = b"1\tAQ==\n1\t\xff\xfe\n-1\tAAAc\n";
        let mut out = Vec::new();
        let written = convert_to_libsvm(&config, input, &mut out).unwrap();
        assert_eq!(written, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "-1 19:1 20:1 21:1\n");
    }
}
