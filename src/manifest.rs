//! Dataset manifest parsing.
//!
//! A manifest lists one dataset per line, optionally followed by its sum of
//! weights, cross section and cross-section uncertainty:
//!
//! ```text
//! # dataset                                                 sumw   xsec        errXsec
//! mc12_8TeV.105200.McAtNloJimmy_CT10_ttbar.merge.NTUP_SUSY...  1      253.0*0.543 0.1
//! ```
//!
//! Lines are selected with a free-text regular expression tested against the
//! whole raw line, so a match may come from any field, including the dataset
//! name itself.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::error::{ManifestError, ParseError};

pub const COMMENT_MARKER: char = '#';
pub const DEFAULT_SUM_OF_WEIGHTS: &str = "1";
pub const DEFAULT_CROSS_SECTION: &str = "-1";
pub const DEFAULT_CROSS_SECTION_ERROR: &str = "-1";

/// Precision of evaluated cross-section products.
const FLOAT_SIGNIFICANT_DIGITS: usize = 12;

/// Per-dataset metadata from one manifest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDefinition {
    pub dataset: String,
    pub sum_of_weights: String,
    /// Always a numeric literal; product expressions are already evaluated.
    pub cross_section: String,
    pub cross_section_error: String,
}

impl JobDefinition {
    /// Creates a definition with default weighting metadata.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            sum_of_weights: DEFAULT_SUM_OF_WEIGHTS.to_string(),
            cross_section: DEFAULT_CROSS_SECTION.to_string(),
            cross_section_error: DEFAULT_CROSS_SECTION_ERROR.to_string(),
        }
    }
}

/// Parses one manifest line.
///
/// Returns `Ok(None)` for blank lines, comments and lines the selection
/// pattern does not match. The pattern is tested against `line` as given,
/// not against the trimmed text.
pub fn parse_line(line: &str, pattern: &Regex) -> Result<Option<JobDefinition>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
        return Ok(None);
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let Some(dataset) = tokens.first() else {
        return Ok(None);
    };

    if !pattern.is_match(line) {
        return Ok(None);
    }

    let mut definition = JobDefinition::new(*dataset);
    if let Some(sumw) = tokens.get(1) {
        definition.sum_of_weights = sumw.to_string();
    }
    if let Some(xsec) = tokens.get(2) {
        definition.cross_section = if xsec.contains('*') {
            evaluate_product(xsec)?
        } else {
            xsec.to_string()
        };
    }
    if let Some(err) = tokens.get(3) {
        definition.cross_section_error = err.to_string();
    }

    Ok(Some(definition))
}

/// Evaluates a product of numeric literals such as `253.0*0.543`.
///
/// Only signed decimal literals (with optional fraction and exponent) joined
/// by `*` are accepted. Integer-only products stay integers (`3*4` gives
/// `12`); anything involving a fraction is rendered as a float (`1.5*2`
/// gives `3.0`, see [`format_float`]).
pub fn evaluate_product(expr: &str) -> Result<String, ParseError> {
    let invalid = |reason: String| ParseError::CrossSection {
        value: expr.to_string(),
        reason,
    };

    let mut factors = Vec::new();
    for raw in expr.split('*') {
        let factor = raw.trim();
        if factor.is_empty() {
            return Err(invalid("empty factor".to_string()));
        }
        if !is_numeric_literal(factor) {
            return Err(invalid(format!("'{factor}' is not a numeric literal")));
        }
        factors.push(factor);
    }

    if factors.iter().all(|f| is_integer_literal(f)) {
        let product = factors.iter().try_fold(1i64, |acc, f| {
            f.parse::<i64>().ok().and_then(|v| acc.checked_mul(v))
        });
        // Overflowing integer products fall through to float arithmetic.
        if let Some(product) = product {
            return Ok(product.to_string());
        }
    }

    let mut product = 1.0f64;
    for factor in &factors {
        let value: f64 = factor
            .parse()
            .map_err(|_| invalid(format!("'{factor}' is not a numeric literal")))?;
        product *= value;
    }
    if !product.is_finite() {
        return Err(invalid("product is not finite".to_string()));
    }

    Ok(format_float(product))
}

/// Renders a float with [`FLOAT_SIGNIFICANT_DIGITS`] significant digits,
/// switching to exponent notation outside `1e-4..1e12` (`0.1*3` gives `0.3`,
/// `1e30*1` gives `1e+30`). Integral values keep a trailing `.0`.
fn format_float(value: f64) -> String {
    let sci = format!("{:.*e}", FLOAT_SIGNIFICANT_DIGITS - 1, value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let text = if (-4..FLOAT_SIGNIFICANT_DIGITS as i32).contains(&exponent) {
        let decimals = (FLOAT_SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    };

    if text.contains(['.', 'e']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn strip_sign(text: &str) -> &str {
    text.strip_prefix(['+', '-']).unwrap_or(text)
}

fn is_integer_literal(text: &str) -> bool {
    let digits = strip_sign(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_numeric_literal(text: &str) -> bool {
    let body = strip_sign(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next().unwrap_or("");
    let mantissa_ok = (!whole.is_empty() || !fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());

    let exponent_ok = match exponent {
        Some(exp) => is_integer_literal(exp),
        None => true,
    };

    mantissa_ok && exponent_ok
}

/// Lazily yields job definitions from a manifest, one line at a time.
///
/// Errors carry the manifest name and 1-based line number. After a read
/// error the reader stops; parse errors do not stop iteration, so the
/// caller decides whether to continue past a bad line. Bytes that are not
/// valid UTF-8 are replaced rather than treated as a read error.
pub struct ManifestReader<'a, R> {
    source: PathBuf,
    reader: R,
    buf: Vec<u8>,
    pattern: &'a Regex,
    line_no: usize,
    exhausted: bool,
}

impl<'a, R: BufRead> ManifestReader<'a, R> {
    pub fn new(source: impl Into<PathBuf>, reader: R, pattern: &'a Regex) -> Self {
        Self {
            source: source.into(),
            reader,
            buf: Vec::new(),
            pattern,
            line_no: 0,
            exhausted: false,
        }
    }

    /// Path or label of the manifest being read.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl<'a> ManifestReader<'a, BufReader<File>> {
    /// Opens a manifest file for reading.
    pub fn open<P: AsRef<Path>>(path: P, pattern: &'a Regex) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path, BufReader::new(file), pattern))
    }
}

impl<R: BufRead> Iterator for ManifestReader<'_, R> {
    type Item = Result<JobDefinition, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    self.exhausted = true;
                    return Some(Err(ManifestError::Io {
                        path: self.source.clone(),
                        source,
                    }));
                }
            }
            self.line_no += 1;

            let raw = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf[..]);
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw);

            match parse_line(&line, self.pattern) {
                Ok(Some(definition)) => return Some(Ok(definition)),
                Ok(None) => continue,
                Err(source) => {
                    return Some(Err(ManifestError::Parse(ParseError::Line {
                        file: self.source.display().to_string(),
                        line: self.line_no,
                        field: "cross section",
                        source: Box::new(source),
                    })));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn test_single_token_uses_defaults() {
        let def = parse_line("mc12_8TeV.1.a.merge.NTUP_SUSY.e1_r4485_p1512/", &pattern("mc"))
            .unwrap()
            .unwrap();
        assert_eq!(def.dataset, "mc12_8TeV.1.a.merge.NTUP_SUSY.e1_r4485_p1512/");
        assert_eq!(def.sum_of_weights, "1");
        assert_eq!(def.cross_section, "-1");
        assert_eq!(def.cross_section_error, "-1");
    }

    #[test]
    fn test_all_fields_present() {
        let def = parse_line("  mc12_8TeV.2.b/  1000  3*4  0.05  ", &pattern("mc"))
            .unwrap()
            .unwrap();
        assert_eq!(def.sum_of_weights, "1000");
        assert_eq!(def.cross_section, "12");
        assert_eq!(def.cross_section_error, "0.05");
    }

    #[test]
    fn test_cross_section_without_product_passes_through() {
        let def = parse_line("mc12_8TeV.3.c/ 1 7.5", &pattern("mc")).unwrap().unwrap();
        assert_eq!(def.cross_section, "7.5");
    }

    #[test]
    fn test_skips_blank_comment_and_unmatched() {
        let p = pattern("mc");
        assert!(parse_line("", &p).unwrap().is_none());
        assert!(parse_line("    \t", &p).unwrap().is_none());
        assert!(parse_line("# mc12_8TeV.1.commented/", &p).unwrap().is_none());
        assert!(parse_line("   # indented comment mc", &p).unwrap().is_none());
        assert!(parse_line("data12_8TeV.periodB.physics_Muons/", &p).unwrap().is_none());
    }

    #[test]
    fn test_pattern_matches_anywhere_in_line() {
        // "mc" only appears in a trailing field, which is still enough.
        let def = parse_line("data12_8TeV.periodB/ 1 1 mc", &pattern("mc")).unwrap();
        assert!(def.is_some());
    }

    #[test]
    fn test_pattern_sees_untrimmed_line() {
        let p = pattern("^ mc");
        assert!(parse_line(" mc12_8TeV.1.x/", &p).unwrap().is_some());
        assert!(parse_line("mc12_8TeV.1.x/", &p).unwrap().is_none());
    }

    #[test]
    fn test_pattern_is_case_sensitive_by_default() {
        assert!(parse_line("MC12_8TeV.1.x/", &pattern("mc")).unwrap().is_none());
        let insensitive = regex::RegexBuilder::new("mc")
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(parse_line("MC12_8TeV.1.x/", &insensitive).unwrap().is_some());
    }

    #[test]
    fn test_evaluate_product() {
        assert_eq!(evaluate_product("3*4").unwrap(), "12");
        assert_eq!(evaluate_product("1.5*2").unwrap(), "3.0");
        assert_eq!(evaluate_product("0.5 * 0.25").unwrap(), "0.125");
        assert_eq!(evaluate_product("-2*3").unwrap(), "-6");
        assert_eq!(evaluate_product("1e3*2").unwrap(), "2000.0");
        assert_eq!(evaluate_product("253.0*0.543*1.1").unwrap(), "151.1169");
    }

    #[test]
    fn test_evaluate_product_float_formatting() {
        assert_eq!(evaluate_product("0.1*3").unwrap(), "0.3");
        assert_eq!(evaluate_product("-1.5*2").unwrap(), "-3.0");
        assert_eq!(evaluate_product("2.0*0.0001").unwrap(), "0.0002");
        assert_eq!(evaluate_product("0.0*5.5").unwrap(), "0.0");
        assert_eq!(evaluate_product("123456789012.0*1").unwrap(), "123456789012.0");
        assert_eq!(evaluate_product("1e30*1.0").unwrap(), "1e+30");
        assert_eq!(evaluate_product("1e-5*1.0").unwrap(), "1e-05");
        assert_eq!(evaluate_product("9223372036854775807*2").unwrap(), "1.84467440737e+19");
    }

    #[test]
    fn test_evaluate_product_rejects_non_literals() {
        for expr in ["3*x", "2**3", "*4", "__import__('os')*1", "1*inf", "1*nan", "4*.", "3*1e"] {
            match evaluate_product(expr) {
                Err(ParseError::CrossSection { value, .. }) => assert_eq!(value, expr),
                other => panic!("Expected CrossSection error for {expr}, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_evaluate_product_overflow_falls_back_to_float() {
        let result = evaluate_product("9223372036854775807*2").unwrap();
        let value: f64 = result.parse().unwrap();
        assert!(value > 1.8e19);
    }

    #[test]
    fn test_reader_yields_in_order_and_reports_line() {
        let manifest = "\
# header
mc12_8TeV.1.first/ 10 2*3

mc12_8TeV.2.second/ 20 1*y
data12_8TeV.periodA/
mc12_8TeV.3.third/
";
        let p = pattern("mc");
        let mut reader = ManifestReader::new("bkg.txt", Cursor::new(manifest), &p);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.dataset, "mc12_8TeV.1.first/");
        assert_eq!(first.cross_section, "6");

        match reader.next().unwrap() {
            Err(ManifestError::Parse(ParseError::Line { file, line, field, .. })) => {
                assert_eq!(file, "bkg.txt");
                assert_eq!(line, 4);
                assert_eq!(field, "cross section");
            }
            other => panic!("Expected line error, got {:?}", other),
        }

        let third = reader.next().unwrap().unwrap();
        assert_eq!(third.dataset, "mc12_8TeV.3.third/");
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_continues_past_invalid_utf8() {
        let manifest: &[u8] =
            b"mc12_8TeV.1.first/\n# comment by M\xFCller\nmc12_8TeV.2.second/ 1 0.5 \xB10.1\r\nmc12_8TeV.3.third/";
        let p = pattern("mc");
        let defs: Vec<_> = ManifestReader::new("m.txt", Cursor::new(manifest), &p)
            .collect::<Result<_, _>>()
            .unwrap();

        let datasets: Vec<_> = defs.iter().map(|d| d.dataset.as_str()).collect();
        assert_eq!(datasets, ["mc12_8TeV.1.first/", "mc12_8TeV.2.second/", "mc12_8TeV.3.third/"]);
        assert_eq!(defs[1].cross_section, "0.5");
        assert_eq!(defs[1].cross_section_error, "\u{FFFD}0.1");
    }

    #[test]
    fn test_reader_line_numbers_count_invalid_utf8_lines() {
        let manifest: &[u8] = b"# \xFF\xFE\nmc12_8TeV.1.x/ 1 2*q\n";
        let p = pattern("mc");
        let mut reader = ManifestReader::new("m.txt", Cursor::new(manifest), &p);
        match reader.next().unwrap() {
            Err(ManifestError::Parse(ParseError::Line { line, .. })) => assert_eq!(line, 2),
            other => panic!("Expected line error, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let p = pattern("mc");
        let result = ManifestReader::open("/nonexistent/manifest.txt", &p);
        assert!(matches!(result, Err(ManifestError::Io { .. })));
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("signal.txt");
        std::fs::write(&path, "mc12_8TeV.176270.WH/ 5000\n").unwrap();

        let p = pattern("mc");
        let defs: Vec<_> = ManifestReader::open(&path, &p)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].sum_of_weights, "5000");
    }
}
