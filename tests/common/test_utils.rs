use std::{fs, path::PathBuf};

/// Temporary record file that is removed again when the test ends
pub struct TestFile {
    path: PathBuf,
}

impl TestFile {
    /// Create a path named after the test, inside the system temp dir
    pub fn new(test_name: &str) -> Self {
        let path = std::env::temp_dir()
            .join(format!("hbf_test_{}_{}.txt", test_name, std::process::id()));
        Self { path }
    }

    /// Create the file with the given lines already in it
    #[allow(dead_code)]
    pub fn with_lines(test_name: &str, lines: &[&str]) -> Self {
        let file = Self::new(test_name);
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&file.path, content).expect("failed to write test input");
        file
    }

    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }

    /// Read the file back line by line
    #[allow(dead_code)]
    pub fn lines(&self) -> Vec<String> {
        fs::read_to_string(&self.path)
            .expect("failed to read test output")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Drop for TestFile {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}
