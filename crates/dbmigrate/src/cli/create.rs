use std::path::PathBuf;

use anyhow::Result;
use console::style;

use dbmigrate_runtime::StubGenerator;

/// Create an empty migration file.
pub struct CreateCommand {
    pub name: String,
    pub dir: PathBuf,
}

impl CreateCommand {
    /// Never loads config or touches the database.
    pub fn execute(self) -> Result<()> {
        let path = StubGenerator::new(&self.dir).create(&self.name)?;

        println!(
            "  {} Created {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
        println!();
        Ok(())
    }
}
