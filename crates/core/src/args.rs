//! Compiler argument lists.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;
use crate::session::SessionState;

/// Path the model source is written to when the session has no name.
pub const DEFAULT_INPUT_PATH: &str = "input.scad";

/// Default render output path.
pub const DEFAULT_OUTPUT_PATH: &str = "out.stl";

/// Output path of a syntax-check run.
pub const SYNTAX_CHECK_OUTPUT_PATH: &str = "out.ast";

static PARAMETER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_]*$").expect("valid regex"));

/// Arguments for a full render of `input` into `output`.
///
/// Layout: `<input> -o <output> --enable=<f>... -D <name>=<value>...`.
/// Features keep the session's order; parameters come in name order.
pub fn render_args(
    input: &str,
    output: &str,
    state: &SessionState,
) -> Result<Vec<String>, CoreError> {
    let mut args = vec![input.to_string(), "-o".to_string(), output.to_string()];

    for feature in &state.features {
        if feature.is_empty() || feature.chars().any(char::is_whitespace) {
            return Err(CoreError::Validation(format!(
                "invalid feature name {feature:?}"
            )));
        }
        args.push(format!("--enable={feature}"));
    }

    for (name, value) in &state.parameters {
        if !PARAMETER_NAME_RE.is_match(name) {
            return Err(CoreError::Validation(format!(
                "invalid parameter name {name:?}"
            )));
        }
        args.push("-D".to_string());
        args.push(format!("{name}={value}"));
    }

    Ok(args)
}

/// Arguments for a parse-only run exporting an AST.
pub fn syntax_check_args(input: &str, state: &SessionState) -> Result<Vec<String>, CoreError> {
    render_args(input, SYNTAX_CHECK_OUTPUT_PATH, state)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn state() -> SessionState {
        let mut state = SessionState::default_with_source("cube(size);");
        state.features = vec!["manifold".into(), "lazy-union".into()];
        state
    }

    #[test]
    fn render_args_follow_compiler_layout() {
        let mut state = state();
        state.parameters.insert("size".into(), "10".into());
        state.parameters.insert("label".into(), "\"x\"".into());

        let args = render_args("input.scad", "out.stl", &state).expect("valid args");
        assert_eq!(
            args,
            vec![
                "input.scad",
                "-o",
                "out.stl",
                "--enable=manifold",
                "--enable=lazy-union",
                "-D",
                "label=\"x\"",
                "-D",
                "size=10",
            ]
        );
    }

    #[test]
    fn syntax_check_exports_ast() {
        let args = syntax_check_args("model.scad", &state()).expect("valid args");
        assert_eq!(&args[..3], ["model.scad", "-o", "out.ast"]);
    }

    #[test]
    fn invalid_parameter_name_is_rejected() {
        let mut state = state();
        state.parameters.insert("size; rm".into(), "1".into());
        assert_matches!(
            render_args("input.scad", "out.stl", &state),
            Err(CoreError::Validation(msg)) if msg.contains("size; rm")
        );
    }

    #[test]
    fn feature_with_whitespace_is_rejected() {
        let mut state = state();
        state.features.push("fast csg".into());
        assert_matches!(
            syntax_check_args("input.scad", &state),
            Err(CoreError::Validation(_))
        );
    }
}
