pub mod draw_map;
pub mod export_web;
pub mod load_cities;

use std::path::Path;
use log::{info, error};

use crate::errors::Result;


pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self, dir: &Path) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    fn process(&mut self, dir: &Path) -> Result<()> {
        info!(etl_name = self.etl_name(); "Starting ETL process");
        if self.is_cached(dir)? {
            info!(etl_name = self.etl_name(); "Using cached value");
        } else {
            info!(etl_name = self.etl_name(); "Extracting");
            let input = match self.extract(dir) {
                Ok(input) => Ok(input),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Extraction failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Transforming");
            let output = match self.transform(input) {
                Ok(output) => Ok(output),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Transformation failed with error");
                    Err(err)
                },
            }?;

            info!(etl_name = self.etl_name(); "Loading");
            match self.load(dir, output) {
                Ok(_) => Ok(()),
                Err(err) => {
                    error!(etl_name = self.etl_name(), err = err.message.as_str(); "Loading failed with error");
                    Err(err)
                },
            }?;
        }
        info!(etl_name = self.etl_name(); "Process finished");
        Ok(())
    }
}

/// Removes a stage output if present.
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    if path.try_exists()? {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    struct CountingEtl {
        runs: usize,
        fail_transform: bool,
    }

    impl Etl for CountingEtl {
        type Input = u32;
        type Output = u32;

        fn etl_name(&self) -> &str {
            "counting"
        }

        fn is_cached(&self, dir: &Path) -> Result<bool> {
            Ok(dir.join("count.txt").exists())
        }

        fn clean(&self, dir: &Path) -> Result<()> {
            remove_if_exists(&dir.join("count.txt"))
        }

        fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
            self.runs += 1;
            Ok(20)
        }

        fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
            if self.fail_transform {
                return Err("no".into());
            }
            Ok(input + 1)
        }

        fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
            std::fs::write(dir.join("count.txt"), output.to_string())?;
            Ok(())
        }
    }

    #[test]
    fn cached_output_skips_the_stage() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let mut etl = CountingEtl { runs: 0, fail_transform: false };
        etl.clean(&dir).unwrap();
        etl.process(&dir).unwrap();
        etl.process(&dir).unwrap();
        assert_eq!(etl.runs, 1);
        assert_eq!(std::fs::read_to_string(dir.join("count.txt")).unwrap(), "21");

        etl.clean(&dir).unwrap();
        etl.clean(&dir).unwrap();
        etl.process(&dir).unwrap();
        assert_eq!(etl.runs, 2);
    }

    #[test]
    fn stage_errors_propagate() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let mut etl = CountingEtl { runs: 0, fail_transform: true };
        let err = etl.process(&dir).unwrap_err();
        assert_eq!(err.message, "no");
        assert!(!etl.is_cached(&dir).unwrap());
    }
}
