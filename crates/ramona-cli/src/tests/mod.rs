//! Entry-point tests driving [`run_with_loader`] against a fake daemon.

pub(crate) mod support;

use super::*;

use std::io::Cursor;

use ortho_config::OrthoConfig;
use ramona_config::{Config, SocketEndpoint};
use rstest::{fixture, rstest};

use support::{FakeDaemon, Reply, vacant_endpoint};

struct StaticConfigLoader {
    config: Config,
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        let args = ["ramona", "--server-uri", "invalid://socket"].map(OsString::from);
        Config::load_from_iter(args).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Default)]
struct TestWorld {
    config: Config,
    stdin: String,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<ExitCode>,
}

impl TestWorld {
    fn point_at(&mut self, endpoint: SocketEndpoint) {
        self.config.server_uri = endpoint;
    }

    fn type_lines(&mut self, lines: &[&str]) {
        for line in lines {
            self.stdin.push_str(line);
            self.stdin.push('\n');
        }
    }

    fn run(&mut self, command: &str) {
        let loader = StaticConfigLoader {
            config: self.config.clone(),
        };
        self.run_with(command, &loader);
    }

    fn run_with(&mut self, command: &str, loader: &impl ConfigLoader) {
        self.stdout.clear();
        self.stderr.clear();
        let args = Self::build_args(command);
        let mut stdin = Cursor::new(self.stdin.clone().into_bytes());
        let mut io = IoStreams::new(&mut stdin, &mut self.stdout, &mut self.stderr);
        let exit = run_with_loader(args, &mut io, loader);
        self.exit_code = Some(exit);
    }

    fn build_args(command: &str) -> Vec<OsString> {
        let mut args = vec![OsString::from("ramona")];
        args.extend(command.split_whitespace().map(OsString::from));
        args
    }

    fn stdout_text(&self) -> String {
        String::from_utf8(self.stdout.clone()).expect("stdout utf8")
    }

    fn stderr_text(&self) -> String {
        String::from_utf8(self.stderr.clone()).expect("stderr utf8")
    }

    fn assert_exit_code(&self, expected: u8) {
        let exit = self.exit_code.expect("exit code recorded");
        assert_eq!(
            exit,
            ExitCode::from(expected),
            "stderr: {}",
            self.stderr_text()
        );
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

#[rstest]
fn status_prints_the_daemon_result(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::ok("web RUNNING")]).expect("daemon");
    world.point_at(daemon.endpoint());

    world.run("status web");

    world.assert_exit_code(0);
    assert_eq!(world.stdout_text(), "web RUNNING\n");
    let requests = daemon.finish().expect("daemon finished");
    let request = requests.first().expect("one request");
    assert_eq!(request.call_id, 4);
    assert_eq!(request.payload, br#"{"programs":["web"]}"#.to_vec());
}

#[rstest]
fn results_already_ending_in_newline_are_not_padded(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::ok("done\n")]).expect("daemon");
    world.point_at(daemon.endpoint());

    world.run("stop --force web");

    world.assert_exit_code(0);
    assert_eq!(world.stdout_text(), "done\n");
    let requests = daemon.finish().expect("daemon finished");
    assert_eq!(requests.first().map(|request| request.call_id), Some(2));
}

#[rstest]
fn remote_exceptions_exit_with_their_code(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::exception("unknown program 'db'")]).expect("daemon");
    world.point_at(daemon.endpoint());

    world.run("restart db");

    world.assert_exit_code(7);
    assert!(world.stdout.is_empty());
    assert!(world.stderr_text().contains("unknown program 'db'"));
}

#[rstest]
fn absent_daemon_exits_with_server_absent(mut world: TestWorld) {
    world.point_at(vacant_endpoint().expect("vacant endpoint"));

    world.run("status");

    world.assert_exit_code(2);
    assert!(world.stderr_text().contains("not responding"));
}

#[rstest]
fn protocol_violations_exit_with_their_code(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::Raw(b"HTTP/1.1 400".to_vec())]).expect("daemon");
    world.point_at(daemon.endpoint());

    world.run("call 9 ping");

    world.assert_exit_code(5);
}

#[rstest]
fn timeouts_exit_with_stalled_read(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::Stall]).expect("daemon");
    world.point_at(daemon.endpoint());

    world.run("--timeout-ms 100 status");

    world.assert_exit_code(8);
}

#[rstest]
fn failed_auto_start_exits_with_start_failure(mut world: TestWorld) {
    world.point_at(vacant_endpoint().expect("vacant endpoint"));
    world.config.daemon_binary = "/definitely/not/here/ramonad".into();

    world.run("start web");

    world.assert_exit_code(3);
    assert!(world.stderr_text().contains("/definitely/not/here/ramonad"));
}

#[rstest]
fn usage_errors_exit_with_ex_usage(mut world: TestWorld) {
    world.run("frobnicate");

    world.assert_exit_code(64);
    assert!(!world.stderr.is_empty());
}

#[rstest]
fn help_is_printed_to_stdout(mut world: TestWorld) {
    world.run("--help");

    world.assert_exit_code(0);
    assert!(world.stdout_text().contains("Usage"));
    assert!(world.stderr.is_empty());
}

#[rstest]
fn configuration_failures_exit_with_ex_config(mut world: TestWorld) {
    world.run_with("status", &FailingConfigLoader);

    world.assert_exit_code(78);
    assert!(world.stderr_text().contains("failed to load configuration"));
}

#[rstest]
#[case::bare("")]
#[case::explicit("console")]
fn console_reuses_one_connection(mut world: TestWorld, #[case] command: &str) {
    // The fake daemon accepts a single connection, so a reconnect would stall.
    let daemon = FakeDaemon::spawn(vec![Reply::Echo, Reply::Echo]).expect("daemon");
    world.point_at(daemon.endpoint());
    world.type_lines(&["status web", "", "stop --force db"]);

    world.run(command);

    world.assert_exit_code(0);
    let stdout = world.stdout_text();
    assert!(stdout.starts_with(console::PROMPT));
    assert!(stdout.contains(r#"{"programs":["web"]}"#));
    let requests = daemon.finish().expect("daemon finished");
    let call_ids: Vec<u32> = requests.iter().map(|request| request.call_id).collect();
    assert_eq!(call_ids, vec![4, 2]);
}

#[rstest]
#[case::exit("exit")]
#[case::quit("quit")]
fn console_stops_at_exit(mut world: TestWorld, #[case] line: &str) {
    let daemon = FakeDaemon::spawn(vec![Reply::Echo]).expect("daemon");
    world.point_at(daemon.endpoint());
    world.type_lines(&[line, "status web"]);

    world.run("");

    world.assert_exit_code(0);
    assert!(daemon.finish().expect("daemon finished").is_empty());
}

#[rstest]
fn console_survives_remote_exceptions_and_typos(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::exception("unknown program 'db'"), Reply::Echo])
        .expect("daemon");
    world.point_at(daemon.endpoint());
    world.type_lines(&["restart db", "frobnicate", "status web"]);

    world.run("");

    world.assert_exit_code(0);
    let stderr = world.stderr_text();
    assert!(stderr.contains("unknown program 'db'"));
    assert!(stderr.contains("frobnicate"));
    assert!(world.stdout_text().contains(r#"{"programs":["web"]}"#));
    assert_eq!(daemon.finish().expect("daemon finished").len(), 2);
}

#[rstest]
fn console_ends_when_the_connection_is_lost(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(vec![Reply::Close]).expect("daemon");
    world.point_at(daemon.endpoint());
    world.type_lines(&["status", "status"]);

    world.run("");

    world.assert_exit_code(9);
    assert_eq!(daemon.finish().expect("daemon finished").len(), 1);
}

#[rstest]
fn console_without_a_daemon_exits_with_server_absent(mut world: TestWorld) {
    world.point_at(vacant_endpoint().expect("vacant endpoint"));
    world.type_lines(&["status"]);

    world.run("");

    world.assert_exit_code(2);
    assert!(world.stderr_text().contains("not responding"));
}

#[rstest]
fn console_help_goes_to_stdout(mut world: TestWorld) {
    let daemon = FakeDaemon::spawn(Vec::new()).expect("daemon");
    world.point_at(daemon.endpoint());
    world.type_lines(&["help"]);

    world.run("");

    world.assert_exit_code(0);
    assert!(world.stdout_text().contains("exit"));
    assert!(world.stderr.is_empty());
}

#[test]
fn empty_results_print_nothing() {
    let mut stdout = Vec::new();
    write_result(&mut stdout, b"").expect("write");
    assert!(stdout.is_empty());
}
