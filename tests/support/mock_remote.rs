// ABOUTME: In-memory stand-in for a remote host.
// ABOUTME: Interprets the small shell subset the remote helpers emit against a fake directory tree.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tether::remote::Remote;
use tether::ssh::{EXIT_INTERRUPTED, Error, ExecOutput, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Node {
    Dir(BTreeMap<String, Node>),
    File(String),
}

impl Node {
    fn empty_dir() -> Self {
        Node::Dir(BTreeMap::new())
    }
}

fn components(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(str::to_string)
        .collect()
}

/// A fake host with a directory tree, a list of installed programs, and a command log.
pub struct MockRemote {
    host: String,
    address: String,
    root: Mutex<Node>,
    programs: Vec<String>,
    log: Mutex<Vec<String>>,
    closed: Mutex<bool>,
}

impl MockRemote {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            address: format!("{host}:22"),
            root: Mutex::new(Node::empty_dir()),
            programs: vec!["sh".to_string(), "cat".to_string()],
            log: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    /// Make `which <name>` succeed.
    pub fn with_program(mut self, name: &str) -> Self {
        self.programs.push(name.to_string());
        self
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Contents of a file in the fake tree.
    pub fn file(&self, path: &str) -> Option<String> {
        match self.lookup(path)? {
            Node::File(content) => Some(content),
            Node::Dir(_) => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.lookup(path), Some(Node::Dir(_)))
    }

    fn lookup(&self, path: &str) -> Option<Node> {
        let root = self.root.lock();
        let mut node = &*root;
        for part in components(path) {
            match node {
                Node::Dir(children) => node = children.get(&part)?,
                Node::File(_) => return None,
            }
        }
        Some(node.clone())
    }

    /// Create a directory; `parents` behaves like `mkdir -p`.
    fn mkdir(&self, path: &str, parents: bool) -> std::result::Result<(), String> {
        let parts = components(path);
        let mut root = self.root.lock();
        let mut node = &mut *root;
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            let Node::Dir(children) = node else {
                return Err(format!("mkdir: {path}: Not a directory"));
            };
            if !children.contains_key(part) {
                if !last && !parents {
                    return Err(format!("mkdir: {path}: No such file or directory"));
                }
                children.insert(part.clone(), Node::empty_dir());
            } else if last && !parents {
                return Err(format!("mkdir: {path}: File exists"));
            }
            node = children.get_mut(part).ok_or("vanished")?;
        }
        Ok(())
    }

    fn write(&self, path: &str, content: String) -> std::result::Result<(), String> {
        let mut parts = components(path);
        let name = parts.pop().ok_or_else(|| "cat: missing path".to_string())?;
        let mut root = self.root.lock();
        let mut node = &mut *root;
        for part in parts {
            match node {
                Node::Dir(children) => {
                    node = children
                        .get_mut(&part)
                        .ok_or_else(|| format!("{path}: No such file or directory"))?;
                }
                Node::File(_) => return Err(format!("{path}: Not a directory")),
            }
        }
        match node {
            Node::Dir(children) => {
                children.insert(name, Node::File(content));
                Ok(())
            }
            Node::File(_) => Err(format!("{path}: Not a directory")),
        }
    }

    fn remove(&self, path: &str) {
        let mut parts = components(path);
        let Some(name) = parts.pop() else {
            *self.root.lock() = Node::empty_dir();
            return;
        };
        let mut root = self.root.lock();
        let mut node = &mut *root;
        for part in parts {
            match node {
                Node::Dir(children) => match children.get_mut(&part) {
                    Some(child) => node = child,
                    None => return,
                },
                Node::File(_) => return,
            }
        }
        if let Node::Dir(children) = node {
            children.remove(&name);
        }
    }

    fn run(&self, command: &str) -> ExecOutput {
        let (first, body) = match command.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (command, None),
        };
        let words = split_words(first);
        let args: Vec<&str> = words.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["cat", ">", path, "<<", marker] => {
                let body = body.unwrap_or("");
                let mut content = String::new();
                for line in body.lines() {
                    if line == *marker {
                        break;
                    }
                    content.push_str(line);
                    content.push('\n');
                }
                status(self.write(path, content))
            }
            ["cat", path] => match self.file(path) {
                Some(content) => ok(content),
                None => fail(1, format!("cat: {path}: No such file or directory")),
            },
            ["mkdir", "-p", path] => status(self.mkdir(path, true)),
            ["mkdir", path] => status(self.mkdir(path, false)),
            ["rm", "-rf", path] => {
                self.remove(path);
                ok(String::new())
            }
            ["test", flag, path] | ["[", flag, path, "]"] => {
                let found = match (*flag, self.lookup(path)) {
                    ("-e", Some(_)) => true,
                    ("-d", Some(Node::Dir(_))) => true,
                    ("-f", Some(Node::File(_))) => true,
                    _ => false,
                };
                if found { ok(String::new()) } else { fail(1, String::new()) }
            }
            ["which", name] => {
                if self.programs.iter().any(|p| p == *name) {
                    ok(format!("/usr/bin/{name}\n"))
                } else {
                    fail(1, String::new())
                }
            }
            ["uname"] | ["uname", "-s"] => ok("Linux\n".to_string()),
            ["uname", "-m"] => ok("x86_64\n".to_string()),
            ["uname", "-a"] => ok(format!("Linux {} 6.1.0 x86_64 GNU/Linux\n", self.host)),
            ["exit"] => ok(String::new()),
            ["exit", code] => fail(code.parse().unwrap_or(1), String::new()),
            ["echo", rest @ ..] => ok(format!("{}\n", rest.join(" "))),
            [program, ..] => fail(127, format!("sh: {program}: command not found")),
            [] => ok(String::new()),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

fn ok(stdout: String) -> ExecOutput {
    ExecOutput {
        stdout: stdout.into_bytes(),
        stderr: Vec::new(),
        exit_code: 0,
    }
}

fn fail(code: i32, stderr: String) -> ExecOutput {
    let stderr = if stderr.is_empty() {
        Vec::new()
    } else {
        format!("{stderr}\n").into_bytes()
    };
    ExecOutput {
        stdout: Vec::new(),
        stderr,
        exit_code: code,
    }
}

fn status(result: std::result::Result<(), String>) -> ExecOutput {
    match result {
        Ok(()) => ok(String::new()),
        Err(message) => fail(1, message),
    }
}

/// Split a command line into words, honoring single and double quotes.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[async_trait]
impl Remote for MockRemote {
    fn host(&self) -> &str {
        &self.host
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput> {
        self.check_open()?;
        self.log.lock().push(command.to_string());
        Ok(self.run(command))
    }

    async fn exec_stream(
        &self,
        command: &str,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<i32> {
        self.check_open()?;
        self.log.lock().push(command.to_string());
        if cancel.is_cancelled() {
            return Ok(EXIT_INTERRUPTED);
        }
        let output = self.run(command);
        stdout.write_all(&output.stdout).await?;
        stderr.write_all(&output.stderr).await?;
        Ok(output.exit_code)
    }

    async fn exec_pty(&self, command: &str) -> Result<ExecOutput> {
        let mut output = Remote::exec(self, command).await?;
        // A terminal has one output stream.
        let stderr = std::mem::take(&mut output.stderr);
        output.stdout.extend(stderr);
        Ok(output)
    }

    async fn shell(
        &self,
        stdin: &mut (dyn AsyncRead + Unpin + Send),
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        stderr: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<i32> {
        self.check_open()?;
        let mut script = String::new();
        stdin.read_to_string(&mut script).await?;

        let mut last = 0;
        for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.log.lock().push(line.to_string());
            let output = self.run(line);
            stdout.write_all(&output.stdout).await?;
            stderr.write_all(&output.stderr).await?;
            last = output.exit_code;
            if line == "exit" || line.starts_with("exit ") {
                break;
            }
        }
        Ok(last)
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}
