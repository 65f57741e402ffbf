//! Workload classification and parent-controller detection.
//!
//! Classification is a pure, total function over a binding's process name,
//! command line and port. It walks an ordered table of runtime rules; the
//! first rule whose executable pattern matches decides the coarse tag, and
//! that rule's refinements may narrow it to a framework. Nothing matched
//! means `AppType::Other`.
//!
//! Parent-controller detection inspects exactly one level up the process
//! tree and reports the parent when its executable looks like a supervisor
//! that restarts children (dev servers, file watchers, reloaders).

use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

use crate::binding::{Binding, ParentLink};
use crate::process::table::{ProcessMeta, ProcessTable};

/// Workload tag attached to every binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Node,
    NextJs,
    React,
    Vue,
    Angular,
    Express,
    Static,
    Python,
    Flask,
    Django,
    FastApi,
    Php,
    Laravel,
    Java,
    Spring,
    DotNet,
    MySql,
    Postgres,
    MongoDb,
    Redis,
    Nginx,
    Apache,
    Browser,
    Other,
}

impl AppType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Node => "node",
            AppType::NextJs => "nextjs",
            AppType::React => "react",
            AppType::Vue => "vue",
            AppType::Angular => "angular",
            AppType::Express => "express",
            AppType::Static => "static",
            AppType::Python => "python",
            AppType::Flask => "flask",
            AppType::Django => "django",
            AppType::FastApi => "fastapi",
            AppType::Php => "php",
            AppType::Laravel => "laravel",
            AppType::Java => "java",
            AppType::Spring => "spring",
            AppType::DotNet => "dotnet",
            AppType::MySql => "mysql",
            AppType::Postgres => "postgres",
            AppType::MongoDb => "mongodb",
            AppType::Redis => "redis",
            AppType::Nginx => "nginx",
            AppType::Apache => "apache",
            AppType::Browser => "browser",
            AppType::Other => "other",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AppType::Node => "Node.js",
            AppType::NextJs => "Next.js",
            AppType::React => "React",
            AppType::Vue => "Vue",
            AppType::Angular => "Angular",
            AppType::Express => "Express",
            AppType::Static => "Static",
            AppType::Python => "Python",
            AppType::Flask => "Flask",
            AppType::Django => "Django",
            AppType::FastApi => "FastAPI",
            AppType::Php => "PHP",
            AppType::Laravel => "Laravel",
            AppType::Java => "Java",
            AppType::Spring => "Spring",
            AppType::DotNet => ".NET",
            AppType::MySql => "MySQL",
            AppType::Postgres => "Postgres",
            AppType::MongoDb => "MongoDB",
            AppType::Redis => "Redis",
            AppType::Nginx => "nginx",
            AppType::Apache => "Apache",
            AppType::Browser => "Browser",
            AppType::Other => "Other",
        }
    }

    /// Parses a tag as produced by `as_str`.
    pub fn parse(tag: &str) -> Option<AppType> {
        ALL_APP_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag))
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ALL_APP_TYPES: [AppType; 24] = [
    AppType::Node,
    AppType::NextJs,
    AppType::React,
    AppType::Vue,
    AppType::Angular,
    AppType::Express,
    AppType::Static,
    AppType::Python,
    AppType::Flask,
    AppType::Django,
    AppType::FastApi,
    AppType::Php,
    AppType::Laravel,
    AppType::Java,
    AppType::Spring,
    AppType::DotNet,
    AppType::MySql,
    AppType::Postgres,
    AppType::MongoDb,
    AppType::Redis,
    AppType::Nginx,
    AppType::Apache,
    AppType::Browser,
    AppType::Other,
];

/// Narrows a generic runtime to a framework.
///
/// Command-line tokens of all refinements are tried before any default-port
/// match, so an explicit invocation always beats a port coincidence.
#[derive(Debug)]
pub struct Refinement {
    pub tag: AppType,
    pub cmdline_tokens: &'static [&'static str],
    pub default_ports: &'static [RangeInclusive<u16>],
}

/// One entry of the ordered runtime table.
#[derive(Debug)]
pub struct RuntimeRule {
    pub tag: AppType,
    /// Substrings of the lower-cased executable name.
    pub name_patterns: &'static [&'static str],
    pub refinements: &'static [Refinement],
}

impl RuntimeRule {
    fn matches_name(&self, name: &str) -> bool {
        self.name_patterns.iter().any(|p| name.contains(p))
    }

    fn refine(&self, cmdline: &str, port: u16) -> Option<AppType> {
        self.refinements
            .iter()
            .find(|r| r.cmdline_tokens.iter().any(|t| cmdline.contains(t)))
            .or_else(|| {
                self.refinements
                    .iter()
                    .find(|r| r.default_ports.iter().any(|range| range.contains(&port)))
            })
            .map(|r| r.tag)
    }
}

/// Ordered classification table. First matching rule wins.
pub static RUNTIME_RULES: &[RuntimeRule] = &[
    RuntimeRule {
        tag: AppType::Node,
        name_patterns: &["node", "npm"],
        refinements: &[
            Refinement {
                tag: AppType::NextJs,
                cmdline_tokens: &["next-server", "next dev", "next start", "/next/", "next"],
                default_ports: &[],
            },
            Refinement {
                tag: AppType::React,
                cmdline_tokens: &["react-scripts", "react", "vite"],
                default_ports: &[5173..=5173],
            },
            Refinement {
                tag: AppType::Vue,
                cmdline_tokens: &["vue-cli-service", "vue"],
                default_ports: &[],
            },
            Refinement {
                tag: AppType::Angular,
                cmdline_tokens: &["angular", "ng serve"],
                default_ports: &[4200..=4200],
            },
            Refinement {
                tag: AppType::Express,
                cmdline_tokens: &["express"],
                default_ports: &[],
            },
            Refinement {
                tag: AppType::Static,
                cmdline_tokens: &["http-server", "serve -s", "serve -l", "/serve/", "bin/serve"],
                default_ports: &[],
            },
        ],
    },
    RuntimeRule {
        tag: AppType::Python,
        name_patterns: &["python"],
        refinements: &[
            Refinement {
                tag: AppType::Flask,
                cmdline_tokens: &["flask"],
                default_ports: &[5000..=5000],
            },
            Refinement {
                tag: AppType::Django,
                cmdline_tokens: &["django", "manage.py"],
                default_ports: &[8000..=8000],
            },
            Refinement {
                tag: AppType::FastApi,
                cmdline_tokens: &["fastapi", "uvicorn"],
                default_ports: &[],
            },
        ],
    },
    RuntimeRule {
        tag: AppType::Php,
        name_patterns: &["php"],
        refinements: &[Refinement {
            tag: AppType::Laravel,
            cmdline_tokens: &["laravel", "artisan"],
            default_ports: &[8000..=8000],
        }],
    },
    RuntimeRule {
        tag: AppType::Java,
        name_patterns: &["java"],
        refinements: &[Refinement {
            tag: AppType::Spring,
            cmdline_tokens: &["spring"],
            default_ports: &[8080..=8080],
        }],
    },
    RuntimeRule {
        tag: AppType::DotNet,
        name_patterns: &["dotnet"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::MySql,
        name_patterns: &["mysql", "mariadb"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::Postgres,
        name_patterns: &["postgres"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::MongoDb,
        name_patterns: &["mongo"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::Redis,
        name_patterns: &["redis"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::Nginx,
        name_patterns: &["nginx"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::Apache,
        name_patterns: &["httpd", "apache"],
        refinements: &[],
    },
    RuntimeRule {
        tag: AppType::Browser,
        name_patterns: &["chrome", "chromium", "msedge", "firefox", "brave", "safari"],
        refinements: &[],
    },
];

/// Classifies a process by name, command line and port.
pub fn classify_process(process_name: &str, cmdline: &str, port: u16) -> AppType {
    let name = process_name.to_lowercase();
    let cmd = cmdline.to_lowercase();

    RUNTIME_RULES
        .iter()
        .find(|rule| rule.matches_name(&name))
        .map(|rule| rule.refine(&cmd, port).unwrap_or(rule.tag))
        .unwrap_or(AppType::Other)
}

/// Classifies a binding. Total and deterministic.
pub fn classify(binding: &Binding) -> AppType {
    classify_process(&binding.process_name, &binding.command_line, binding.port)
}

/// Pattern for a process that restarts its children.
#[derive(Debug)]
pub struct SupervisorRule {
    pub label: &'static str,
    /// Exact executable names, compared without extension and case.
    pub names: &'static [&'static str],
    /// Substrings of the lower-cased command line.
    pub cmdline_tokens: &'static [&'static str],
}

impl SupervisorRule {
    fn matches(&self, parent: &ProcessMeta) -> bool {
        let name = parent.name.to_lowercase();
        let stem = name.split('.').next().unwrap_or(name.as_str());
        let cmd = parent.cmdline.to_lowercase();
        self.names.iter().any(|n| *n == stem) || self.cmdline_tokens.iter().any(|t| cmd.contains(t))
    }
}

/// Known supervisor patterns.
pub static SUPERVISOR_RULES: &[SupervisorRule] = &[
    SupervisorRule {
        label: "laravel artisan",
        names: &["artisan"],
        cmdline_tokens: &["artisan serve"],
    },
    SupervisorRule {
        label: "node watchers",
        names: &["nodemon", "npm", "npx", "yarn", "pnpm"],
        cmdline_tokens: &["nodemon", "next dev", "vite", "webpack serve", "ts-node-dev"],
    },
    SupervisorRule {
        label: "python reloaders",
        names: &[],
        cmdline_tokens: &["manage.py runserver", "--reload", "flask run", "watchmedo"],
    },
    SupervisorRule {
        label: "generic file watchers",
        names: &["watchexec", "cargo-watch", "entr", "air"],
        cmdline_tokens: &["dotnet watch", "spring-boot:run", "bootrun"],
    },
];

/// Returns the supervisor rule matching `parent`, if any.
pub fn match_supervisor(parent: &ProcessMeta) -> Option<&'static SupervisorRule> {
    SUPERVISOR_RULES.iter().find(|rule| rule.matches(parent))
}

/// Looks one level up from `pid` and returns a link when the parent is a
/// live supervisor. pid 0, pid 1 and self-parenting are never linked.
pub fn detect_parent_link(pid: u32, table: &ProcessTable) -> Option<ParentLink> {
    let process = table.get(pid)?;
    let parent_pid = process.parent_pid?;
    if parent_pid <= 1 || parent_pid == pid {
        return None;
    }
    let parent = table.get(parent_pid)?;
    if !parent.is_alive() {
        return None;
    }
    match_supervisor(parent).map(|_| ParentLink {
        parent_pid,
        parent_name: parent.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Tests for classify_process
    // -------------------------------------------------------------------------

    #[test]
    fn test_classify_unknown_is_other() {
        assert_eq!(classify_process("totally_unknown_xyz", "", 1234), AppType::Other);
        assert_eq!(classify_process("", "", 0), AppType::Other);
    }

    #[test]
    fn test_classify_plain_runtimes() {
        assert_eq!(classify_process("node", "node server.js", 3000), AppType::Node);
        assert_eq!(classify_process("python3", "python3 worker.py", 9999), AppType::Python);
        assert_eq!(classify_process("postgres", "", 5432), AppType::Postgres);
        assert_eq!(classify_process("mysqld", "", 3306), AppType::MySql);
        assert_eq!(classify_process("redis-server", "", 6379), AppType::Redis);
        assert_eq!(classify_process("mongod", "", 27017), AppType::MongoDb);
        assert_eq!(classify_process("nginx", "", 80), AppType::Nginx);
        assert_eq!(classify_process("httpd", "", 80), AppType::Apache);
        assert_eq!(classify_process("dotnet", "", 5001), AppType::DotNet);
        assert_eq!(classify_process("firefox", "", 50123), AppType::Browser);
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify_process("Node.exe", "", 3000), AppType::Node);
        assert_eq!(classify_process("Python.exe", "MANAGE.PY runserver", 9000), AppType::Django);
    }

    #[test]
    fn test_cmdline_refinement() {
        assert_eq!(
            classify_process("node", "node /app/node_modules/.bin/next dev", 3000),
            AppType::NextJs
        );
        assert_eq!(classify_process("node", "node node_modules/vite/bin/vite.js", 3000), AppType::React);
        assert_eq!(classify_process("python", "python -m flask run", 8000), AppType::Flask);
        assert_eq!(classify_process("python", "uvicorn main:app", 8001), AppType::FastApi);
        assert_eq!(classify_process("php", "php artisan serve", 8000), AppType::Laravel);
        assert_eq!(classify_process("java", "java -jar spring-app.jar", 9090), AppType::Spring);
    }

    #[test]
    fn test_port_refinement() {
        assert_eq!(classify_process("python3", "python3 app.py", 8000), AppType::Django);
        assert_eq!(classify_process("python3", "python3 app.py", 5000), AppType::Flask);
        assert_eq!(classify_process("node", "node index.js", 4200), AppType::Angular);
        assert_eq!(classify_process("java", "java -jar app.jar", 8080), AppType::Spring);
    }

    #[test]
    fn test_cmdline_beats_port() {
        // FastAPI explicitly invoked on Django's default port stays FastAPI.
        assert_eq!(classify_process("python", "uvicorn api:app --port 8000", 8000), AppType::FastApi);
    }

    #[test]
    fn test_refinement_never_contradicts_runtime() {
        // Framework tokens on a non-interpreter executable do not refine.
        assert_eq!(classify_process("postgres", "django flask next", 8000), AppType::Postgres);
        assert_eq!(classify_process("unknownd", "manage.py", 8000), AppType::Other);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for _ in 0..10 {
            assert_eq!(classify_process("node", "next dev", 3000), AppType::NextJs);
        }
    }

    #[test]
    fn test_app_type_parse_roundtrip() {
        for t in ALL_APP_TYPES {
            assert_eq!(AppType::parse(t.as_str()), Some(t));
        }
        assert_eq!(AppType::parse("nope"), None);
    }

    // -------------------------------------------------------------------------
    // Tests for detect_parent_link
    // -------------------------------------------------------------------------

    #[test]
    fn test_parent_link_for_supervisor() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(111, "php").with_parent(50).with_cmdline("php -S 127.0.0.1:8000"),
            ProcessMeta::new(50, "artisan").with_parent(1),
        ]);
        let link = detect_parent_link(111, &table).expect("artisan parent should be linked");
        assert_eq!(link.parent_pid, 50);
        assert_eq!(link.parent_name, "artisan");
    }

    #[test]
    fn test_parent_link_by_cmdline() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(200, "python3").with_parent(199),
            ProcessMeta::new(199, "python3").with_cmdline("python3 manage.py runserver"),
        ]);
        assert_eq!(detect_parent_link(200, &table).map(|l| l.parent_pid), Some(199));
    }

    #[test]
    fn test_no_parent_link_for_shell_or_init() {
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(300, "node").with_parent(299),
            ProcessMeta::new(299, "bash"),
            ProcessMeta::new(400, "node").with_parent(1),
            ProcessMeta::new(1, "systemd"),
        ]);
        assert!(detect_parent_link(300, &table).is_none());
        assert!(detect_parent_link(400, &table).is_none());
    }

    #[test]
    fn test_only_one_level_is_inspected() {
        // node <- bash <- nodemon: the grandparent supervisor is not linked.
        let table = ProcessTable::from_entries(vec![
            ProcessMeta::new(30, "node").with_parent(20),
            ProcessMeta::new(20, "bash").with_parent(10),
            ProcessMeta::new(10, "nodemon"),
        ]);
        assert!(detect_parent_link(30, &table).is_none());
    }

    #[test]
    fn test_supervisor_names_are_exact() {
        assert!(match_supervisor(&ProcessMeta::new(1, "npm.cmd")).is_some());
        assert!(match_supervisor(&ProcessMeta::new(1, "sentry")).is_none());
        assert!(match_supervisor(&ProcessMeta::new(1, "repair")).is_none());
    }

    #[test]
    fn test_dead_parent_not_linked() {
        let mut zombie = ProcessMeta::new(60, "nodemon");
        zombie.state = crate::process::table::RunState::Zombie;
        let table = ProcessTable::from_entries(vec![ProcessMeta::new(61, "node").with_parent(60), zombie]);
        assert!(detect_parent_link(61, &table).is_none());
    }
}
