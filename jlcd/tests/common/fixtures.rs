use std::fs;
use std::net::TcpListener;
use std::path::Path;
use tempfile::TempDir;

pub const SOURCEMAP: &str = r#"{
    "name": "Game",
    "className": "DataModel",
    "children": [
        {
            "name": "ReplicatedStorage",
            "className": "ReplicatedStorage",
            "children": [
                { "name": "Packages", "className": "Folder", "children": [
                    { "name": "Jest", "className": "ModuleScript" }
                ]},
                { "name": "math.spec", "className": "ModuleScript", "filePaths": ["src/math.spec.lua"] },
                { "name": "__tests__", "className": "Folder" }
            ]
        },
        { "name": "ServerScriptService", "className": "ServerScriptService" }
    ]
}"#;

pub const CONFIG: &str = r#"cwdInstance = "game"
roots = ["game/ReplicatedStorage"]

[config]
verbose = true
"#;

/// A project directory with a sourcemap and a run config.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        crate::test_log!("FIXTURE: Creating test workspace");

        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("sourcemap.json"), SOURCEMAP)
            .expect("Failed to write sourcemap.json");
        fs::write(dir.path().join("jest-runner.toml"), CONFIG)
            .expect("Failed to write jest-runner.toml");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// A localhost port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    listener.local_addr().expect("Failed to read local addr").port()
}
