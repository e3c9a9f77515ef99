//! Typed `-filter_complex` builder.
//!
//! A [`FilterGraph`] is a list of [`FilterChain`]s joined with `;`. Each chain
//! reads labelled streams, applies comma-separated [`Filter`]s and writes
//! labelled outputs:
//!
//! ```text
//! [1:a][2:a]concat=n=2:v=0:a=1[a_concat];[a_concat]afade=t=in:st=0:d=1[a_out]
//! ```

use std::fmt;

/// Escape a value for use inside a filter argument.
///
/// Filter graphs treat `:` and `,` as separators and `\` as an escape
/// character.
pub fn escape_filter_value(raw: &str) -> String {
    raw.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace(',', r"\,")
        .replace('\'', r"\'")
}

/// Stream selector or named pad, rendered in brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamLabel(String);

impl StreamLabel {
    /// Audio stream of input `index`, `[N:a]`.
    pub fn audio(index: usize) -> Self {
        Self(format!("{index}:a"))
    }

    /// Video stream of input `index`, `[N:v]`.
    pub fn video(index: usize) -> Self {
        Self(format!("{index}:v"))
    }

    pub fn named(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Value for `-map`, including the brackets.
    pub fn map_arg(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// A single filter with positional and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push((None, value.to_string()));
        self
    }

    /// `key=value` argument.
    pub fn kv(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.args.push((Some(key.to_string()), value.to_string()));
        self
    }

    /// `concat` of `n` segments with the given stream counts per segment.
    pub fn concat(n: usize, video: u8, audio: u8) -> Self {
        Self::new("concat").kv("n", n).kv("v", video).kv("a", audio)
    }

    /// One-second `fade`/`afade` of kind `in` or `out` starting at `start`.
    fn one_second_fade(name: &str, kind: &str, start: f64) -> Self {
        let start = if start == 0.0 {
            "0".to_string()
        } else {
            format!("{start:.3}")
        };
        Self::new(name).kv("t", kind).kv("st", start).kv("d", 1)
    }

    /// `fade=t=in:st=0:d=1,fade=t=out:st=<total-1>:d=1` style pair.
    pub fn fade_pair(name: &str, total_secs: f64) -> [Self; 2] {
        let out_start = (total_secs - 1.0).max(0.0);
        [
            Self::one_second_fade(name, "in", 0.0),
            Self::one_second_fade(name, "out", out_start),
        ]
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = key {
                write!(f, "{key}=")?;
            }
            f.write_str(&escape_filter_value(value))?;
        }
        Ok(())
    }
}

/// Labelled inputs, a comma-separated filter list, labelled outputs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    inputs: Vec<StreamLabel>,
    filters: Vec<Filter>,
    outputs: Vec<StreamLabel>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: StreamLabel) -> Self {
        self.inputs.push(label);
        self
    }

    pub fn inputs(mut self, labels: impl IntoIterator<Item = StreamLabel>) -> Self {
        self.inputs.extend(labels);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn output(mut self, label: StreamLabel) -> Self {
        self.outputs.push(label);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "{label}")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for label in &self.outputs {
            write!(f, "{label}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{chain}")?;
        }
        Ok(())
    }
}
