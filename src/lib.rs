pub mod diagnostic;
pub mod export;
pub mod ir;
pub mod isa;
pub mod lift;
pub mod parser;
pub mod print;
pub mod span;

// Re-export the public API — `teallift::lift_source()` etc.
pub use export::{encode, BasicBlockProgram};
pub use lift::{lift, Lift, LiftOptions};
pub use print::{format_dot, format_program};

use diagnostic::{render_diagnostics, Diagnostic, Diagnostics};

/// Parse and lift a program, rendering diagnostics to stderr.
pub fn lift_source(
    source: &str,
    filename: &str,
    options: LiftOptions,
) -> Result<Lift, Vec<Diagnostic>> {
    match lift_source_silent(source, filename, options) {
        Ok(lifted) => {
            render_diagnostics(&lifted.warnings, filename, source);
            Ok(lifted)
        }
        Err(errors) => {
            render_diagnostics(&errors, filename, source);
            Err(errors)
        }
    }
}

/// Parse and lift a program without touching stderr. Warnings ride along
/// on the `Lift`; on failure the error vector carries them too, fatal
/// diagnostics last.
pub fn lift_source_silent(
    source: &str,
    filename: &str,
    options: LiftOptions,
) -> Result<Lift, Vec<Diagnostic>> {
    let program = parser::parse(0, filename, source).map_err(|fatal| vec![fatal])?;
    let mut diags = Diagnostics::new();
    let labels = parser::gather_labels(&program, &mut diags);
    let mut label_warnings = diags.into_warnings();

    match lift::lift(&program, &labels, options) {
        Ok(mut lifted) => {
            label_warnings.append(&mut lifted.warnings);
            lifted.warnings = label_warnings;
            Ok(lifted)
        }
        Err(mut errors) => {
            label_warnings.append(&mut errors);
            Err(label_warnings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lift_source_silent_happy_path() {
        let lifted = lift_source_silent(
            "int 1\nint 2\n+\nreturn\n",
            "add.teal",
            LiftOptions::default(),
        )
        .unwrap();
        assert_eq!(lifted.regions.len(), 1);
        assert!(lifted.warnings.is_empty());
    }

    #[test]
    fn test_parse_error_surfaces_as_single_diagnostic() {
        let errors =
            lift_source_silent("return\norphan:\n", "bad.teal", LiftOptions::default())
                .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("no operation found"));
    }

    #[test]
    fn test_label_warnings_precede_fatal_errors() {
        let source = "dup:\nint 1\ndup:\nb nowhere\n";
        let errors =
            lift_source_silent(source, "bad.teal", LiftOptions::default()).unwrap_err();
        assert!(errors.len() >= 2);
        assert!(errors[0].message.contains("redefined"));
        assert!(errors
            .last()
            .unwrap()
            .message
            .contains("destination for label `nowhere` not found"));
    }
}
