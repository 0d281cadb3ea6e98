pub mod build;
pub mod clean;
pub mod list;

use crate::cli::BuildArgs;
use crate::result::Result;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CommandType {
    Build {
        args: Box<BuildArgs>,
        verbose: bool,
    },
    List {
        json: bool,
    },
    Clean {
        build_dir: Option<PathBuf>,
        aggressive: bool,
    },
}

impl CommandType {
    pub async fn execute(self) -> Result<bool> {
        match self {
            CommandType::Build { args, verbose } => build::execute(*args, verbose).await,
            CommandType::List { json } => list::execute(json).await,
            CommandType::Clean {
                build_dir,
                aggressive,
            } => clean::execute(build_dir, aggressive).await,
        }
    }
}

#[derive(Default)]
pub struct CommandExecutor {
    verbose: bool,
}

impl CommandExecutor {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub async fn build_project(&mut self, args: BuildArgs) -> Result<bool> {
        CommandType::Build {
            args: Box::new(args),
            verbose: self.verbose,
        }
        .execute()
        .await
    }

    pub async fn list_compilers(&mut self, json: bool) -> Result<bool> {
        CommandType::List { json }.execute().await
    }

    pub async fn clean(&mut self, build_dir: Option<PathBuf>, aggressive: bool) -> Result<bool> {
        CommandType::Clean {
            build_dir,
            aggressive,
        }
        .execute()
        .await
    }
}
