use std::{fs::File, path::Path};

use log::debug;
use polars::prelude::*;

use crate::error::Result;

use super::write::PendingWrite;

/// Returns the frame stored at `path`, or runs `producer`, stores its result atomically and
/// returns it. Parquet keeps column dtypes and row order.
pub fn memoize_frame(path: &Path, producer: impl FnOnce() -> Result<DataFrame>) -> Result<DataFrame> {
    if path.exists() {
        debug!("[memoize] hit {}", path.display());
        return read_frame(path);
    }
    debug!("[memoize] miss {}", path.display());
    let df = producer()?;
    write_frame(path, &df)?;
    Ok(df)
}

pub fn write_frame(path: &Path, df: &DataFrame) -> Result<()> {
    let mut pending = PendingWrite::open(path)?;
    ParquetWriter::new(&mut pending).finish(&mut df.clone())?;
    pending.finalize()?;
    Ok(())
}

pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::common::frame::FrameBuilder;

    #[test]
    fn producer_runs_once_and_dtypes_survive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x/df/AT/area.parquet");
        let calls = Cell::new(0);
        let produce = || {
            calls.set(calls.get() + 1);
            FrameBuilder::new()
                .i32("year", vec![2010, 1990])
                .f64("area", vec![1.5, f64::NAN])
                .str("land_use", vec!["forest".into(), "missing".into()])
                .build()
        };

        let first = memoize_frame(&path, produce).unwrap();
        let second = memoize_frame(&path, || panic!("must not recompute")).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first.schema(), second.schema());
        assert_eq!(second.column("year").unwrap().dtype(), &DataType::Int32);
        let years: Vec<Option<i32>> = second.column("year").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(years, vec![Some(2010), Some(1990)]);
        assert!(second.column("area").unwrap().f64().unwrap().get(1).unwrap().is_nan());
    }

    #[test]
    fn producer_errors_leave_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.parquet");
        let res = memoize_frame(&path, || Err(crate::error::PullerError::config("boom")));
        assert!(res.is_err());
        assert!(!path.exists());
    }
}
