use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

use crate::config::ToolConfig;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
pub const FOLDER_PLACEHOLDER: &str = "{folder}";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} command template is empty")]
    EmptyCommand { tool: &'static str },
    #[error("failed to launch {tool} ({program}): {source}")]
    Spawn {
        tool: &'static str,
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} failed on {target} with {status}: {stderr}")]
    Failed {
        tool: &'static str,
        target: PathBuf,
        status: String,
        stderr: String,
    },
}

/// External converters the rebuild pipeline drives. Each produces exactly one file.
pub trait AssetTools {
    fn convert_xml_to_yax(&mut self, xml: &Path, yax: &Path) -> Result<(), ToolError>;
    fn compile_script(&mut self, source: &Path, output: &Path) -> Result<(), ToolError>;
    fn repack_pak(&mut self, folder: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Runs the argv templates from [`ToolConfig`] as child processes.
#[derive(Debug, Clone)]
pub struct CommandTools {
    xml_to_yax: Vec<String>,
    compile_script: Vec<String>,
    repack_pak: Vec<String>,
}

impl CommandTools {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            xml_to_yax: config.xml_to_yax.clone(),
            compile_script: config.compile_script.clone(),
            repack_pak: config.repack_pak.clone(),
        }
    }
}

impl AssetTools for CommandTools {
    fn convert_xml_to_yax(&mut self, xml: &Path, yax: &Path) -> Result<(), ToolError> {
        run_template("xml_to_yax", &self.xml_to_yax, xml, yax, xml)
    }

    fn compile_script(&mut self, source: &Path, output: &Path) -> Result<(), ToolError> {
        run_template("compile_script", &self.compile_script, source, output, source)
    }

    fn repack_pak(&mut self, folder: &Path, output: &Path) -> Result<(), ToolError> {
        run_template("repack_pak", &self.repack_pak, folder, output, folder)
    }
}

fn run_template(
    tool: &'static str,
    template: &[String],
    input: &Path,
    output: &Path,
    target: &Path,
) -> Result<(), ToolError> {
    let argv = expand_template(template, input, output);
    let Some((program, args)) = argv.split_first() else {
        return Err(ToolError::EmptyCommand { tool });
    };
    debug!(tool, program = %program, args = ?args, "tool_invoked");

    let result: Output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ToolError::Spawn {
            tool,
            program: program.clone(),
            source,
        })?;
    if result.status.success() {
        return Ok(());
    }
    Err(ToolError::Failed {
        tool,
        target: target.to_path_buf(),
        status: result.status.to_string(),
        stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
    })
}

/// `{folder}` is an alias of `{input}` for the repacker template.
fn expand_template(template: &[String], input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace(INPUT_PLACEHOLDER, &input)
                .replace(FOLDER_PLACEHOLDER, &input)
                .replace(OUTPUT_PLACEHOLDER, &output)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn placeholders_expand_inside_arguments() {
        let argv = expand_template(
            &template(&["mrbc", "-o{output}", "{input}", "--in={folder}"]),
            Path::new("/w/a.rb"),
            Path::new("/w/a"),
        );
        assert_eq!(argv, template(&["mrbc", "-o/w/a", "/w/a.rb", "--in=/w/a.rb"]));
    }

    #[test]
    fn empty_template_is_rejected() {
        let error = run_template("xml_to_yax", &[], Path::new("a"), Path::new("b"), Path::new("a"))
            .expect_err("empty");
        assert!(matches!(error, ToolError::EmptyCommand { tool: "xml_to_yax" }));
    }

    #[test]
    fn missing_program_reports_spawn_failure() {
        let error = run_template(
            "repack_pak",
            &template(&["pakwatch-definitely-not-a-real-program", "{folder}"]),
            Path::new("/w/x.pak"),
            Path::new("/x.pak"),
            Path::new("/w/x.pak"),
        )
        .expect_err("spawn");
        assert!(matches!(error, ToolError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() {
        let error = run_template(
            "compile_script",
            &template(&["sh", "-c", "echo broken >&2; exit 3"]),
            Path::new("/w/a.rb"),
            Path::new("/w/a"),
            Path::new("/w/a.rb"),
        )
        .expect_err("exit 3");
        match error {
            ToolError::Failed { stderr, target, .. } => {
                assert_eq!(stderr, "broken");
                assert_eq!(target, PathBuf::from("/w/a.rb"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_tools_write_through_the_template() {
        let temp = tempfile::TempDir::new().expect("temp");
        let input = temp.path().join("a.xml");
        let output = temp.path().join("a.yax");
        std::fs::write(&input, "<root/>").expect("write");
        let config = ToolConfig {
            xml_to_yax: template(&["cp", "{input}", "{output}"]),
            ..ToolConfig::default()
        };
        CommandTools::from_config(&config)
            .convert_xml_to_yax(&input, &output)
            .expect("convert");
        assert_eq!(std::fs::read_to_string(output).expect("read"), "<root/>");
    }
}
