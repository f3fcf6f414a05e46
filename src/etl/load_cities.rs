use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use rkyv::AlignedVec;

use crate::data::city::CityFeature;
use crate::data::CityDataset;
use crate::errors::Result;

use super::{remove_if_exists, Etl};

pub const ETL_NAME: &str = "load_cities";
pub const OUTPUT_FILE_NAME: &str = "cities.rkyv";

/// Parses the city GeoJSON once and caches the features in an rkyv archive.
pub struct LoadCitiesEtl {
    data_path: PathBuf,
}

impl LoadCitiesEtl {
    pub fn new(data_path: &Path) -> LoadCitiesEtl {
        LoadCitiesEtl {
            data_path: data_path.to_path_buf(),
        }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    /// Reads the dataset cached by a previous run of this stage.
    pub fn read_cache(dir: &Path) -> Result<CityDataset> {
        let mut input_file = File::open(Self::output_path(dir))?;
        let mut buf_vec: Vec<u8> = Vec::new();
        input_file.read_to_end(&mut buf_vec)?;

        let mut bytes = AlignedVec::with_capacity(buf_vec.len());
        bytes.extend_from_slice(&buf_vec);
        let features: Vec<CityFeature> = rkyv::from_bytes(&bytes)
            .map_err(|err| format!("Could not deserialize city cache: {err:?}"))?;
        info!(features = features.len(); "Read cities from cache");
        Ok(CityDataset::new(features))
    }
}

impl Etl for LoadCitiesEtl {
    type Input = CityDataset;
    type Output = AlignedVec;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).exists())
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        remove_if_exists(&Self::output_path(dir))
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        CityDataset::open(&self.data_path)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let features = input.features().to_vec();
        rkyv::to_bytes::<_, 256>(&features)
            .map_err(|err| format!("Could not serialize cities: {err:?}").into())
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let mut output_file = File::create(Self::output_path(dir))?;
        output_file.write_all(&output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::city::sample_city;
    use tempfile::tempdir;

    #[test]
    fn geojson_is_cached_and_read_back() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        let dataset = CityDataset::new(vec![
            sample_city("Reykjavik", -21.9, 1500.0, Some(0.75)),
            sample_city("Nuku'alofa", -175.2, 200.0, None),
        ]);
        let data_path = dir.join("cities.geojson");
        std::fs::write(&data_path, dataset.to_geojson().to_string()).unwrap();

        let mut etl = LoadCitiesEtl::new(&data_path);
        etl.clean(&dir).unwrap();
        etl.process(&dir).unwrap();
        assert!(etl.is_cached(&dir).unwrap());

        let cached = LoadCitiesEtl::read_cache(&dir).unwrap();
        assert_eq!(cached.features(), dataset.features());
    }

    #[test]
    fn corrupt_cache_is_an_error() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join(OUTPUT_FILE_NAME), b"definitely not rkyv").unwrap();
        assert!(LoadCitiesEtl::read_cache(&dir).is_err());
    }
}
