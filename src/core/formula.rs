//! Band-algebra formula compiler.
//!
//! Turns a formula written over band keys (`(N-R)/(N+R)`) into a
//! calculator expression over single letters (`(A-B)/(A+B)`) together with
//! the raster source and band number each letter reads from.

use crate::core::expression::{is_calculator_name, is_identifier, tokenize, Expr, TokenKind};
use crate::core::registry::BandRegistry;
use crate::types::{SpectralError, SpectralResult};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Calculator letters in assignment order
const LETTERS: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Band key -> calculator letter, letters handed out in key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: Vec<(String, char)>,
}

impl SymbolTable {
    /// Assign `A, B, C, ...` to `keys` in the order given
    pub fn assign<S: AsRef<str>>(keys: &[S]) -> SpectralResult<Self> {
        check_keys(keys)?;
        let symbols = keys
            .iter()
            .zip(LETTERS.iter())
            .map(|(key, &letter)| (key.as_ref().to_string(), letter))
            .collect();
        Ok(Self { symbols })
    }

    pub fn letter(&self, key: &str) -> Option<char> {
        self.symbols.iter().find(|(k, _)| k == key).map(|(_, l)| *l)
    }

    pub fn key(&self, letter: char) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, l)| *l == letter)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, char)> {
        self.symbols.iter().map(|(k, l)| (k.as_str(), *l))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Reject key sets that cannot be substituted unambiguously
fn check_keys<S: AsRef<str>>(keys: &[S]) -> SpectralResult<()> {
    if keys.len() > LETTERS.len() {
        return Err(SpectralError::SubstitutionAmbiguity(format!(
            "{} bands to bind but only {} calculator letters",
            keys.len(),
            LETTERS.len()
        )));
    }

    let mut seen = BTreeSet::new();
    for key in keys.iter().map(AsRef::as_ref) {
        if !is_identifier(key) {
            return Err(SpectralError::SubstitutionAmbiguity(format!(
                "band key '{}' is not a single identifier token",
                key
            )));
        }
        if is_calculator_name(key) {
            return Err(SpectralError::SubstitutionAmbiguity(format!(
                "band key '{}' collides with a calculator name",
                key
            )));
        }
        if !seen.insert(key) {
            return Err(SpectralError::SubstitutionAmbiguity(format!("band key '{}' listed twice", key)));
        }
    }
    Ok(())
}

fn is_letter(ident: &str) -> bool {
    let mut chars = ident.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

/// Format a constant so the calculator reads back the same value
pub fn literal(value: f64) -> SpectralResult<String> {
    if !value.is_finite() {
        return Err(SpectralError::InvalidInput(format!(
            "Cannot embed non-finite constant {} in a formula",
            value
        )));
    }
    Ok(format!("{}", value))
}

/// A formula ready for the raster calculator
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    /// Formula over calculator letters
    pub formula_text: String,
    /// Band key bound to each letter, in letter order
    pub symbols: Vec<(String, char)>,
    pub band_sources: Vec<(char, PathBuf)>,
    pub band_numbers: Vec<(char, usize)>,
}

impl CompiledExpression {
    /// Bound letters in order
    pub fn letters(&self) -> Vec<char> {
        self.band_sources.iter().map(|(l, _)| *l).collect()
    }

    pub fn letter_for(&self, key: &str) -> Option<char> {
        self.symbols.iter().find(|(k, _)| k == key).map(|(_, l)| *l)
    }

    pub fn key_for(&self, letter: char) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, l)| *l == letter)
            .map(|(k, _)| k.as_str())
    }

    pub fn source_of(&self, letter: char) -> Option<&Path> {
        self.band_sources
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, p)| p.as_path())
    }

    pub fn band_number_of(&self, letter: char) -> Option<usize> {
        self.band_numbers
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, n)| *n)
    }

    /// Letters that occur in the formula text
    pub fn formula_letters(&self) -> SpectralResult<BTreeSet<char>> {
        Ok(tokenize(&self.formula_text)?
            .into_iter()
            .filter(|t| t.kind == TokenKind::Ident && is_letter(t.text))
            .filter_map(|t| t.text.chars().next())
            .collect())
    }

    /// Check the formula parses and that text, sources and band numbers
    /// carry the same letters, each bound once.
    pub fn validate(&self) -> SpectralResult<()> {
        let expr = Expr::parse(&self.formula_text)?;
        let in_text = self.formula_letters()?;

        for var in expr.variables() {
            if !is_letter(&var) {
                return Err(SpectralError::FormulaSyntax(format!(
                    "Unbound name '{}' in '{}'",
                    var, self.formula_text
                )));
            }
        }

        let sources: BTreeSet<char> = self.band_sources.iter().map(|(l, _)| *l).collect();
        let numbers: BTreeSet<char> = self.band_numbers.iter().map(|(l, _)| *l).collect();
        let symbols: BTreeSet<char> = self.symbols.iter().map(|(_, l)| *l).collect();

        if sources.len() != self.band_sources.len() || numbers.len() != self.band_numbers.len() {
            return Err(SpectralError::InvalidInput(format!(
                "Letter bound twice in '{}'",
                self.formula_text
            )));
        }
        if in_text != sources || in_text != numbers || in_text != symbols {
            return Err(SpectralError::InvalidInput(format!(
                "Letters of '{}' {:?} do not match sources {:?} / band numbers {:?}",
                self.formula_text, in_text, sources, numbers
            )));
        }

        // catches unsupported functions and wrong argument counts
        let ones: HashMap<char, f64> = in_text.iter().map(|l| (*l, 1.0)).collect();
        self.evaluate(&ones)?;
        Ok(())
    }

    /// Evaluate the formula for one pixel given a value per letter
    pub fn evaluate(&self, values: &HashMap<char, f64>) -> SpectralResult<f64> {
        let expr = Expr::parse(&self.formula_text)?;
        expr.evaluate(&|name: &str| {
            let mut chars = name.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => values.get(&c).copied(),
                _ => None,
            }
        })
    }
}

/// Compiles formulas against the bands of one image
pub struct FormulaCompiler<'a> {
    registry: &'a BandRegistry,
}

impl<'a> FormulaCompiler<'a> {
    pub fn new(registry: &'a BandRegistry) -> Self {
        Self { registry }
    }

    /// Compile `formula` over `required_bands`, all read from `source`.
    ///
    /// Letters follow the order of `required_bands`. Keys that the formula
    /// never mentions are left unbound.
    pub fn compile<S: AsRef<str>>(
        &self,
        formula: &str,
        required_bands: &[S],
        source: &Path,
    ) -> SpectralResult<CompiledExpression> {
        for key in required_bands.iter().map(AsRef::as_ref) {
            if !self.registry.contains(key) {
                return Err(SpectralError::MissingBand {
                    band: key.to_string(),
                    formula: formula.to_string(),
                });
            }
        }
        check_keys(required_bands)?;

        let tokens = tokenize(formula)?;
        let mentioned = |key: &str| {
            tokens
                .iter()
                .any(|t| t.kind == TokenKind::Ident && t.text == key)
        };

        let mut used = Vec::with_capacity(required_bands.len());
        for key in required_bands.iter().map(AsRef::as_ref) {
            if mentioned(key) {
                used.push(key);
            } else {
                log::warn!("Band '{}' is listed for '{}' but never used; not bound", key, formula);
            }
        }

        let symbols = SymbolTable::assign(&used)?;
        self.compile_with_symbols(formula, &symbols, source)
    }

    /// Compile with letters fixed by a table shared across several formulas
    /// of the same calculator run.
    pub fn compile_with_symbols(
        &self,
        formula: &str,
        symbols: &SymbolTable,
        source: &Path,
    ) -> SpectralResult<CompiledExpression> {
        let tokens = tokenize(formula)?;
        let mut text = String::with_capacity(formula.len());
        let mut bound = BTreeSet::new();

        for token in &tokens {
            if token.kind != TokenKind::Ident {
                text.push_str(token.text);
                continue;
            }

            if let Some(letter) = symbols.letter(token.text) {
                bound.insert(letter);
                text.push(letter);
            } else if self.registry.contains(token.text) {
                return Err(SpectralError::SubstitutionAmbiguity(format!(
                    "'{}' in '{}' is an image band that is not declared for this formula",
                    token.text, formula
                )));
            } else if is_letter(token.text) {
                return Err(SpectralError::SubstitutionAmbiguity(format!(
                    "'{}' in '{}' would be read as a calculator band letter",
                    token.text, formula
                )));
            } else if is_calculator_name(token.text) {
                text.push_str(token.text);
            } else {
                return Err(SpectralError::FormulaSyntax(format!(
                    "Unknown name '{}' in '{}'",
                    token.text, formula
                )));
            }
        }

        let mut expression = CompiledExpression {
            formula_text: text,
            symbols: Vec::with_capacity(bound.len()),
            band_sources: Vec::with_capacity(bound.len()),
            band_numbers: Vec::with_capacity(bound.len()),
        };

        for (key, letter) in symbols.iter().filter(|(_, l)| bound.contains(l)) {
            let position = self.registry.position(key).ok_or_else(|| SpectralError::MissingBand {
                band: key.to_string(),
                formula: formula.to_string(),
            })?;
            expression.symbols.push((key.to_string(), letter));
            expression.band_sources.push((letter, source.to_path_buf()));
            expression.band_numbers.push((letter, position));
        }

        log::debug!("Compiled '{}' -> '{}'", formula, expression.formula_text);
        Ok(expression)
    }

    /// One expression per image band, in band order, all read from `source`.
    ///
    /// `formula_for` is called once per band key, sequentially; letters are
    /// shared so the expressions can run in a single calculator call.
    pub fn compile_each_band<F>(&self, source: &Path, mut formula_for: F) -> SpectralResult<Vec<CompiledExpression>>
    where
        F: FnMut(&str) -> SpectralResult<String>,
    {
        let keys: Vec<&str> = self.registry.keys().collect();
        let symbols = SymbolTable::assign(&keys)?;

        keys.iter()
            .map(|key| {
                let formula = formula_for(key)?;
                self.compile_with_symbols(&formula, &symbols, source)
            })
            .collect()
    }
}

/// Compile one formula against `registry`; see [`FormulaCompiler::compile`]
pub fn compile<S: AsRef<str>>(
    formula: &str,
    required_bands: &[S],
    registry: &BandRegistry,
    source: &Path,
) -> SpectralResult<CompiledExpression> {
    FormulaCompiler::new(registry).compile(formula, required_bands, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BandRegistry {
        BandRegistry::from_keys(&["C", "B", "G", "Y", "R", "RE1", "N", "N2"]).unwrap()
    }

    #[test]
    fn test_letters_follow_required_order() {
        let reg = registry();
        let expr = compile("(N-R)/(N+R)", &["N", "R"], &reg, Path::new("ps.tif")).unwrap();

        assert_eq!(expr.formula_text, "(A-B)/(A+B)");
        assert_eq!(expr.symbols, vec![("N".to_string(), 'A'), ("R".to_string(), 'B')]);
        assert_eq!(expr.band_numbers, vec![('A', 7), ('B', 5)]);
        assert_eq!(expr.source_of('B'), Some(Path::new("ps.tif")));
        expr.validate().unwrap();
    }

    #[test]
    fn test_whole_token_substitution() {
        let reg = registry();
        let expr = compile("(N2-N)/(N2+N)", &["N", "N2"], &reg, Path::new("ps.tif")).unwrap();

        assert_eq!(expr.formula_text, "(B-A)/(B+A)");
        assert_eq!(expr.band_number_of('A'), Some(7));
        assert_eq!(expr.band_number_of('B'), Some(8));
    }

    #[test]
    fn test_missing_band() {
        let reg = BandRegistry::from_keys(&["C", "B", "G", "Y", "R", "RE1", "N2"]).unwrap();
        let err = compile("(N-R)/(N+R)", &["N", "R"], &reg, Path::new("ps.tif")).unwrap_err();
        assert!(matches!(err, SpectralError::MissingBand { ref band, .. } if band == "N"));
    }

    #[test]
    fn test_unused_required_key_is_not_bound() {
        let reg = registry();
        let expr = compile("G/B", &["R", "G", "B"], &reg, Path::new("ps.tif")).unwrap();
        assert_eq!(expr.formula_text, "A/B");
        assert_eq!(expr.letter_for("R"), None);
        expr.validate().unwrap();
    }

    #[test]
    fn test_ambiguous_inputs_rejected() {
        let reg = registry();
        let src = Path::new("ps.tif");

        // undeclared image band
        assert!(matches!(
            compile("(N-R)/(N+G)", &["N", "R"], &reg, src),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
        // stray single letter
        assert!(matches!(
            compile("N*X", &["N"], &reg, src),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
        // duplicate key
        assert!(matches!(
            compile("N", &["N", "N"], &reg, src),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
        // unknown function
        assert!(matches!(
            compile("foo(N)", &["N"], &reg, src),
            Err(SpectralError::FormulaSyntax(_))
        ));
    }

    #[test]
    fn test_reserved_key_rejected() {
        let reg = BandRegistry::from_keys(&["pi", "N"]).unwrap();
        assert!(matches!(
            compile("pi*N", &["pi", "N"], &reg, Path::new("x.tif")),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
    }

    #[test]
    fn test_calculator_names_pass_through() {
        let reg = registry();
        let expr = compile("numpy.sqrt(abs(N)) * pi", &["N"], &reg, Path::new("x.tif")).unwrap();
        assert_eq!(expr.formula_text, "numpy.sqrt(abs(A)) * pi");
        expr.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_calls() {
        let reg = registry();
        let wrong_arity = compile("sqrt(N, R)", &["N", "R"], &reg, Path::new("x.tif")).unwrap();
        assert!(matches!(wrong_arity.validate(), Err(SpectralError::FormulaSyntax(_))));

        let not_a_function = compile("pi(N)", &["N"], &reg, Path::new("x.tif")).unwrap();
        assert!(matches!(not_a_function.validate(), Err(SpectralError::FormulaSyntax(_))));
    }

    #[test]
    fn test_shared_symbols_across_formulas() {
        let reg = registry();
        let keys: Vec<&str> = reg.keys().collect();
        let table = SymbolTable::assign(&keys).unwrap();
        let compiler = FormulaCompiler::new(&reg);

        let coastal = compiler.compile_with_symbols("abs(2 * C)", &table, Path::new("m.tif")).unwrap();
        let nir2 = compiler.compile_with_symbols("abs(2 * N2)", &table, Path::new("m.tif")).unwrap();

        assert_eq!(coastal.formula_text, "abs(2 * A)");
        assert_eq!(nir2.formula_text, "abs(2 * H)");
        assert_eq!(nir2.band_numbers, vec![('H', 8)]);
    }

    #[test]
    fn test_literal_formatting() {
        assert_eq!(literal(0.95).unwrap(), "0.95");
        assert_eq!(literal(-2.3).unwrap(), "-2.3");
        assert_eq!(literal(1.0).unwrap(), "1");
        assert!(literal(f64::NAN).is_err());
        assert!(literal(f64::INFINITY).is_err());
    }

    #[test]
    fn test_too_many_keys() {
        let keys: Vec<String> = (0..27).map(|i| format!("K{}", i)).collect();
        assert!(matches!(
            SymbolTable::assign(&keys),
            Err(SpectralError::SubstitutionAmbiguity(_))
        ));
    }
}
