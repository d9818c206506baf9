//! Engine invocation: argument vector, environment and output layout.

use std::io;
use std::path::{Path, PathBuf};

use fuzzrun_core::{InputMode, Task, TaskKind};

use crate::config::Config;

/// Environment set on every engine process.
pub const ENGINE_ENV: &[(&str, &str)] = &[
    ("AFL_I_DONT_CARE_ABOUT_MISSING_CRASHES", "1"),
    ("AFL_SKIP_CPUFREQ", "1"),
    ("AFL_NO_UI", "1"),
];

/// Subdirectories of each instance output directory.
pub const INSTANCE_SUBDIRS: &[&str] = &["queue", "crashes", "hangs"];

/// A fully resolved engine launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl EngineCommand {
    /// Build the launch of the main engine instance of `task`.
    pub fn for_task(task: &Task, target: &Path, config: &Config) -> Self {
        let user_args: Vec<&str> = task.engine_args.split_whitespace().collect();

        let mut args = vec![
            "-i".to_string(),
            task.seeds_dir.display().to_string(),
            "-o".to_string(),
            task.output_dir.display().to_string(),
        ];
        if !has_timeout(&user_args) {
            args.push("-t".to_string());
            args.push(config.default_timeout_ms.to_string());
        }
        args.extend(user_args.iter().map(|a| a.to_string()));
        if !user_args.contains(&"-m") {
            args.push("-m".to_string());
            args.push("none".to_string());
        }
        if task.kind == TaskKind::Prebuilt && config.qemu_mode && !user_args.contains(&"-Q") {
            args.push("-Q".to_string());
        }
        args.push("-M".to_string());
        args.push(instance_name(0));
        args.push("--".to_string());
        args.push(target.display().to_string());
        if task.input_mode == InputMode::File {
            args.push("@@".to_string());
        }

        Self {
            program: config.engine_path.clone(),
            args,
            envs: ENGINE_ENV
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Convert into a spawnable command.
    pub fn into_command(self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(self.program);
        cmd.args(self.args).envs(self.envs);
        cmd
    }
}

/// Name of the `index`-th engine instance.
pub fn instance_name(index: u32) -> String {
    format!("fuzzer{index}")
}

/// Create `fuzzer<i>/{queue,crashes,hangs}` for every instance.
pub async fn provision_instances(output_dir: &Path, count: u32) -> io::Result<()> {
    for index in 0..count {
        let instance = output_dir.join(instance_name(index));
        for sub in INSTANCE_SUBDIRS {
            tokio::fs::create_dir_all(instance.join(sub)).await?;
        }
    }
    Ok(())
}

fn has_timeout(args: &[&str]) -> bool {
    args.iter().any(|arg| {
        *arg == "-t"
            || arg.starts_with("--timeout")
            || arg
                .strip_prefix("-t")
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzrun_core::{CreateTaskRequest, TaskId};
    use tempfile::TempDir;

    fn task(kind: TaskKind, mode: InputMode, engine_args: &str) -> Task {
        Task::new(
            TaskId::new(3),
            CreateTaskRequest::new("t", kind)
                .with_input_mode(mode)
                .with_engine_args(engine_args),
            PathBuf::from("/data/seeds/task_3"),
            PathBuf::from("/data/outputs/task_3"),
        )
    }

    fn build(task: &Task) -> Vec<String> {
        EngineCommand::for_task(task, Path::new("/bin/target"), &Config::default()).args
    }

    #[test]
    fn test_default_prebuilt_invocation() {
        let args = build(&task(TaskKind::Prebuilt, InputMode::Stdin, ""));
        assert_eq!(
            args,
            [
                "-i", "/data/seeds/task_3", "-o", "/data/outputs/task_3", "-t", "1000", "-m",
                "none", "-Q", "-M", "fuzzer0", "--", "/bin/target",
            ]
        );
    }

    #[test]
    fn test_source_build_with_file_input() {
        let args = build(&task(TaskKind::SourceBuild, InputMode::File, "-x dict.txt"));
        assert!(!args.contains(&"-Q".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("@@"));
        let pos = args.iter().position(|a| a == "-x").unwrap();
        assert_eq!(args[pos + 1], "dict.txt");
    }

    #[test]
    fn test_user_timeout_is_respected() {
        for user in ["-t 500", "-t500", "--timeout=500"] {
            let args = build(&task(TaskKind::Prebuilt, InputMode::Stdin, user));
            assert!(!args.contains(&"1000".to_string()), "{user}");
        }
        let args = build(&task(TaskKind::Prebuilt, InputMode::Stdin, "-tx"));
        assert!(args.contains(&"1000".to_string()));
    }

    #[test]
    fn test_user_memory_and_qemu_flags_not_duplicated() {
        let args = build(&task(TaskKind::Prebuilt, InputMode::Stdin, "-m 200 -Q"));
        assert_eq!(args.iter().filter(|a| *a == "-m").count(), 1);
        assert_eq!(args.iter().filter(|a| *a == "-Q").count(), 1);
        assert!(!args.contains(&"none".to_string()));
    }

    #[test]
    fn test_qemu_disabled_by_config() {
        let mut config = Config::default();
        config.qemu_mode = false;
        let t = task(TaskKind::Prebuilt, InputMode::Stdin, "");
        let cmd = EngineCommand::for_task(&t, Path::new("/bin/target"), &config);
        assert!(!cmd.args.contains(&"-Q".to_string()));
        assert_eq!(cmd.program, config.engine_path);
        assert!(cmd
            .envs
            .contains(&("AFL_SKIP_CPUFREQ".to_string(), "1".to_string())));
    }

    #[tokio::test]
    async fn test_provision_instances() {
        let dir = TempDir::new().unwrap();
        provision_instances(dir.path(), 2).await.unwrap();
        for instance in ["fuzzer0", "fuzzer1"] {
            for sub in INSTANCE_SUBDIRS {
                assert!(dir.path().join(instance).join(sub).is_dir());
            }
        }
        assert!(!dir.path().join("fuzzer2").exists());
    }
}
