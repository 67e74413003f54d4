//! Drives the `sake` binary against throwaway stores.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    fn store(&self) -> PathBuf {
        self.dir.path().join("store").join(".sake")
    }

    fn write(&self, name: &str, text: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).expect("failed to write fixture");
        path.to_string_lossy().into_owned()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_sake"));
        cmd.args(args)
            .current_dir(self.dir.path())
            .env("SAKE_STORE_PATH", self.store())
            .env("SAKE_CONFIG_DIR", self.dir.path().join("config"))
            .env("RUST_LOG", "warn")
            .env("NO_COLOR", "1");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("failed to run sake binary")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const RAKEFILE: &str = r#"
namespace :db do
  desc 'Migrate the database'
  task :migrate => :environment do
    puts 'migrating'
  end
end

desc 'Boot the web tier'
task 'web:start', :port

task :environment
"#;

#[test]
fn install_list_examine_uninstall() {
    let env = Env::new();
    let file = env.write("Rakefile", RAKEFILE);

    let output = env.run(&["install", &file]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "=> Installing task `db:migrate`\n=> Installing task `web:start`\n=> Installing task `environment`\n"
    );
    assert!(env.store().exists());

    let output = env.run(&["install", &file, "db:migrate"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        format!(
            "!! Task `db:migrate` already exists in {}\n",
            env.store().display()
        )
    );

    let output = env.run(&["list"]);
    assert_eq!(
        stdout(&output),
        "sake db:migrate    # Migrate the database\nsake web:start     # Boot the web tier\n"
    );

    let output = env.run(&["ls", "-a", "db"]);
    assert_eq!(stdout(&output), "sake db:migrate   # Migrate the database\n");

    let output = env.run(&["examine", "db:migrate"]);
    assert_eq!(
        stdout(&output),
        "desc 'Migrate the database'\ntask 'db:migrate', :needs => [ 'environment' ] do\n    puts 'migrating'\nend\n"
    );

    let output = env.run(&["uninstall", "web:start", "web:start"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "desc 'Boot the web tier'\ntask 'web:start', :port do |t, args|\nend\n!! Task `web:start` is not installed\n"
    );

    let output = env.run(&["list", "-a"]);
    assert_eq!(
        stdout(&output),
        "sake db:migrate    # Migrate the database\nsake environment\n"
    );
}

#[test]
fn install_from_stdin() {
    let env = Env::new();
    let mut child = env
        .command(&["install", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run sake binary");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"desc 'Hi'\ntask :hi do\n  puts 'hi'\nend\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "=> Installing task `hi`\n");

    let stored = std::fs::read_to_string(env.store()).unwrap();
    assert_eq!(stored, "desc 'Hi'\ntask 'hi' do\n  puts 'hi'\nend\n");
}

#[test]
fn slow_stdin_is_not_cut_off_by_the_parse_timeout() {
    let env = Env::new();
    let mut child = env
        .command(&["install", "-"])
        .env("SAKE_PARSE_TIMEOUT_SECS", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run sake binary");
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"desc 'Slow'\n").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1500));
    stdin.write_all(b"task :slow\n").unwrap();
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "=> Installing task `slow`\n");
}

#[test]
fn failures_are_one_line_and_exit_non_zero() {
    let env = Env::new();

    let output = env.run(&["install", "missing.rake"]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("unable to read definitions from missing.rake"));

    let evil = env.write("evil.rake", "system('rm -rf ~')\ntask :x\n");
    let output = env.run(&["install", &evil]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("refusing call to `system` on line 1"));
    assert_eq!(std::fs::read_to_string(env.store()).ok(), None);

    let output = env.run(&["examine", "nope"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("task `nope` not found"));
}

#[test]
fn store_flag_and_print() {
    let env = Env::new();
    let output = env.run(&["print", "store-path"]);
    assert_eq!(stdout(&output).trim_end(), env.store().to_string_lossy());

    let other = env.dir.path().join("other.sake");
    let output = env.run(&["print", "store-path", "--store", &other.to_string_lossy()]);
    assert_eq!(Path::new(stdout(&output).trim_end()), other);

    let output = env.run(&["print", "config"]);
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(config["port"], 4020);
    assert_eq!(config["engine"], "rake");
}

#[test]
fn version_needs_no_store() {
    let env = Env::new();
    let output = env.run(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("sake, version "));
    assert!(!env.store().exists());
}
