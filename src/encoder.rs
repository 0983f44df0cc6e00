use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filter::{AnyFilter, EncodingFilter, Label};
use crate::mapping::TokenMapping;
use crate::record::record_lines;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

/// Written in place of a record that could not be encoded, so output line
/// numbers keep matching the input.
pub const UNAVAILABLE_LINE: &str = "NOT AVAILABLE";

/// Totals for one [`RecordEncoder::encode_stream`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub encoded: usize,
    pub failed: usize,
}

/// How [`RecordEncoder::encode_text`] splits text into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decomposition {
    /// The trimmed text split on single spaces.
    #[default]
    Words,
    /// Overlapping character windows over the text, spaces written as `_`.
    Ngrams(usize),
}

impl Decomposition {
    pub fn name(&self) -> &'static str {
        match self {
            Decomposition::Words => "words",
            Decomposition::Ngrams(_) => "ngrams",
        }
    }

    /// Window length, 0 for word decomposition.
    pub fn ngram_len(&self) -> usize {
        match self {
            Decomposition::Words => 0,
            Decomposition::Ngrams(n) => *n,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if *self == Decomposition::Ngrams(0) {
            return Err(FilterError::InvalidConfig(
                "N-gram length must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Text shorter than the window yields no tokens.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        match *self {
            Decomposition::Words => text.split(' ').map(String::from).collect(),
            Decomposition::Ngrams(n) => {
                let chars: Vec<char> = text.replace(' ', "_").chars().collect();
                chars.windows(n.max(1)).map(|w| w.iter().collect()).collect()
            }
        }
    }
}

/// Turns token streams into labeled filters.
#[derive(Debug)]
pub struct RecordEncoder {
    config: FilterConfig,
    decomposition: Decomposition,
    mapping: Option<TokenMapping>,
}

impl RecordEncoder {
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            decomposition: Decomposition::Words,
            mapping: None,
        })
    }

    pub fn with_decomposition(
        mut self,
        decomposition: Decomposition,
    ) -> Result<Self> {
        decomposition.validate()?;
        self.decomposition = decomposition;
        Ok(self)
    }

    /// Also collect the positions of every token seen.
    pub fn with_mapping(mut self, mapping: TokenMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// A mapping whose header names this encoder's decomposition.
    pub fn with_default_mapping(self) -> Self {
        let mapping = TokenMapping::new(
            self.decomposition.name(),
            self.decomposition.ngram_len(),
        );
        self.with_mapping(mapping)
    }

    pub fn decomposition(&self) -> Decomposition {
        self.decomposition
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn mapping(&self) -> Option<&TokenMapping> {
        self.mapping.as_ref()
    }

    pub fn into_mapping(self) -> Option<TokenMapping> {
        self.mapping
    }

    pub fn encode<'a, I>(&mut self, tokens: I, label: Label) -> Result<AnyFilter>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut filter = self.config.build_filter()?;
        for token in tokens {
            let positions = filter.insert(token)?;
            if let Some(mapping) = self.mapping.as_mut() {
                mapping.record(token, &positions);
            }
        }
        filter.set_label(label);
        Ok(filter)
    }

    /// Splits `text` with the configured [`Decomposition`].
    pub fn encode_text(
        &mut self,
        text: &str,
        label: Label,
    ) -> Result<AnyFilter> {
        match self.decomposition {
            Decomposition::Words => self.encode(text.trim().split(' '), label),
            other => {
                let tokens = other.tokens(text);
                self.encode(tokens.iter().map(String::as_str), label)
            }
        }
    }

    /// Reads `<label>\t<text>` lines (a line without a tab is unlabeled)
    /// and writes one serialized filter per line.
    pub fn encode_stream<R: BufRead, W: Write>(
        &mut self,
        input: R,
        mut output: W,
    ) -> Result<EncodeReport> {
        let mut report = EncodeReport::default();
        for (idx, line) in record_lines(input).enumerate() {
            match line.and_then(|line| self.encode_line(&line)) {
                Ok(filter) => {
                    writeln!(output, "{}", filter.to_line())?;
                    report.encoded += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(line = idx + 1, "Could not encode record: {}", e);
                    writeln!(output, "{UNAVAILABLE_LINE}")?;
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        output.flush()?;
        info!(
            encoded = report.encoded,
            failed = report.failed,
            "Encoding finished"
        );
        Ok(report)
    }

    fn encode_line(&mut self, line: &str) -> Result<AnyFilter> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (label, text) = match line.split_once('\t') {
            Some((label, text)) => (parse_label(label)?, text),
            None => (Label::Unknown, line),
        };
        debug!(%label, "Encoding: {}", text);
        self.encode_text(text, label)
    }
}

fn parse_label(raw: &str) -> Result<Label> {
    let raw = raw.trim();
    match raw {
        "true" => Ok(Label::Fraud),
        "false" => Ok(Label::Benign),
        "" | "null" => Ok(Label::Unknown),
        _ => raw
            .parse::<i64>()
            .map_err(|e| {
                FilterError::MalformedRecord(format!("invalid label '{raw}': {e}"))
            })
            .and_then(Label::try_from),
    }
}
