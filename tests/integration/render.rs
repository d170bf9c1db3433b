#[path = "common/mod.rs"]
mod common;

use common::{keywords, rendered_lines};
use predicates::prelude::*;
use upstart::{
    Event, EventExpr, JobError, Runlevels, ScriptBlock,
    job::{ConsoleTarget, ExpectType, JobBuilder, LimitValue},
    stanza::Directive,
};

#[test]
fn daemon_job_renders_directives_in_call_order() {
    let mut job = JobBuilder::new();
    job.description("D")
        .unwrap()
        .author("A")
        .unwrap()
        .start_on_runlevel()
        .stop_on_runlevel()
        .run("/usr/bin/my_daemon")
        .unwrap();

    assert_eq!(
        rendered_lines(&job),
        vec![
            "description \"D\"",
            "author \"A\"",
            "start on runlevel [2345]",
            "stop on runlevel [!2345]",
            "exec /usr/bin/my_daemon",
        ]
    );
    assert_eq!(
        keywords(&job),
        vec!["description", "author", "start on", "stop on", "exec"]
    );
}

#[test]
fn repeated_single_valued_calls_keep_one_line() {
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap();
    for (first, second) in [("a", "b"), ("first", "second"), ("x y", "z")] {
        job.description(first).unwrap().description(second).unwrap();
        let lines = rendered_lines(&job);
        let matching: Vec<_> = lines
            .iter()
            .filter(|line| line.starts_with("description "))
            .collect();
        assert_eq!(matching, vec![&format!("description \"{second}\"")]);
    }
}

#[test]
fn repeated_multi_valued_calls_add_lines_in_order() {
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap();
    for n in 0..5 {
        job.env(&format!("VAR_{n}"), &n.to_string()).unwrap();
        job.export(&format!("VAR_{n}")).unwrap();
        job.emits(&format!("event-{n}")).unwrap();
    }

    let rendered = job.render().unwrap();
    for directive in ["env", "export", "emits"] {
        let lines: Vec<_> = rendered
            .lines()
            .filter(|line| line.starts_with(&format!("{directive} ")))
            .collect();
        assert_eq!(lines.len(), 5, "expected five '{directive}' lines");
    }
    assert!(rendered.contains("env VAR_0=0\nenv VAR_1=1\nenv VAR_2=2\n"));
}

#[test]
fn emits_sequence_is_one_line_but_calls_accumulate() {
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap();
    job.emits_all(&["db-ready", "db-migrated"]).unwrap();
    job.emits("db-stopped").unwrap();

    assert_eq!(
        job.document().get(Directive::Emits).unwrap(),
        &["db-ready db-migrated".to_string(), "db-stopped".to_string()][..]
    );
}

#[test]
fn rendering_without_run_fails_until_run_is_set() {
    let mut job = JobBuilder::new();
    job.description("D").unwrap().respawn();
    assert_eq!(job.render(), Err(JobError::IncompleteDocument));

    job.run(ScriptBlock::perl("print 1;").unwrap()).unwrap();
    assert!(job.render().is_ok());
}

#[test]
fn full_service_definition() {
    let mut job = JobBuilder::new();
    job.description("Queue worker")
        .unwrap()
        .author("Ops <ops@example.com>")
        .unwrap()
        .version("1.2")
        .unwrap();
    job.start_on(EventExpr::all([
        Event::new("started").with_env("JOB", "postgresql"),
        Event::new("net-device-up").with_env("IFACE", "eth0"),
    ]))
    .unwrap();
    job.stop_on_runlevels(&Runlevels::parse("!2345").unwrap());
    job.respawn().respawn_limit(10, 5);
    job.expect_type(ExpectType::Fork)
        .console_target(ConsoleTarget::Log);
    job.env("QUEUE", "default").unwrap();
    job.limit("nofile", LimitValue::Value(4096), LimitValue::Value(8192))
        .unwrap();
    job.setuid("worker")
        .unwrap()
        .setgid("worker")
        .unwrap()
        .chdir("/srv/worker")
        .unwrap();
    job.pre_start(ScriptBlock::shell("mkdir -p /run/worker\nchown worker /run/worker").unwrap())
        .unwrap();
    job.run(ScriptBlock::shell_with("exec /srv/worker/bin/run", "/bin/bash").unwrap())
        .unwrap();
    job.post_stop("/srv/worker/bin/cleanup").unwrap();

    let expected = "\
description \"Queue worker\"
author \"Ops <ops@example.com>\"
version \"1.2\"
start on started JOB=\"postgresql\" and net-device-up IFACE=\"eth0\"
stop on runlevel [!2345]
respawn
respawn limit 10 5
expect fork
console log
env QUEUE=default
limit nofile 4096 8192
setuid worker
setgid worker
chdir /srv/worker
pre-start script
mkdir -p /run/worker
chown worker /run/worker
end script
script
/bin/bash <<EOT
exec /srv/worker/bin/run
EOT
end script
post-stop exec /srv/worker/bin/cleanup
";
    assert_eq!(job.render().unwrap(), expected);
}

#[test]
fn rejected_calls_do_not_change_output() {
    let mut job = JobBuilder::new();
    job.run("daemon").unwrap().console(None).unwrap();
    let before = job.render().unwrap();

    assert!(job.console(Some("bogus")).is_err());
    assert!(job.expect("vfork").is_err());
    assert!(job.limit("files", LimitValue::Unlimited, LimitValue::Unlimited).is_err());
    assert!(job.normal_exit::<&str>(&[], &[]).is_err());
    assert!(job.env("1BAD", "x").is_err());

    assert_eq!(job.render().unwrap(), before);
    assert!(predicate::str::contains("console none").eval(&before));
}

#[test]
fn embedded_newlines_cannot_smuggle_extra_stanzas() {
    let mut job = JobBuilder::new();
    job.description("first").unwrap().run("daemon").unwrap();
    let before = job.render().unwrap();

    let err = job.description("first\nexec /bin/evil").unwrap_err();
    assert!(
        predicate::str::contains("description")
            .and(predicate::str::contains("/bin/evil"))
            .eval(&err.to_string())
    );
    assert!(job.run("daemon\nrespawn").is_err());
    assert!(job.post_stop("cleanup\r\nrespawn").is_err());
    assert!(job.setuid("nobody\nrespawn").is_err());
    assert!(job.emits("ready\nrespawn").is_err());
    assert!(job.env("MODE", "prod\nrespawn").is_err());
    assert!(
        job.start_on(Event::new("net-device-up").with_env("IFACE", "eth0\nrespawn"))
            .is_err()
    );

    let after = job.render().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.lines().count(), 2);
    assert!(predicate::str::contains("respawn").not().eval(&after));
}

#[test]
fn errors_identify_directive_and_value() {
    let mut job = JobBuilder::new();
    let err = job.expect("vfork").unwrap_err();
    let message = err.to_string();
    assert!(
        predicate::str::contains("expect")
            .and(predicate::str::contains("vfork"))
            .eval(&message),
        "unexpected message: {message}"
    );
}

#[test]
fn rendering_is_repeatable() {
    let mut job = JobBuilder::new();
    job.description("D")
        .unwrap()
        .run(ScriptBlock::python("print('x')").unwrap())
        .unwrap();
    let first = job.render().unwrap();
    let second = job.render().unwrap();
    assert_eq!(first, second);
    assert!(predicate::str::ends_with("END\nend script\n").eval(&first));
}
