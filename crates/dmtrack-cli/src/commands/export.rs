//! Export command: write the current snapshot as JSON.

use std::path::Path;

use anyhow::{Context, Result};
use dmtrack::{Consumer, SnapshotChannel, SnapshotView, now_millis};

use super::read_live;

pub fn snapshot_view<C, F>(consumer: &mut Consumer<C, F>) -> Result<SnapshotView>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let block = read_live(consumer)?;
    Ok(SnapshotView::new(&block, now_millis()))
}

pub fn run<C, F>(consumer: &mut Consumer<C, F>, output: Option<&Path>) -> Result<()>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let view = snapshot_view(consumer)?;
    match output {
        Some(path) => {
            view.save(path)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("Exported to: {}", path.display());
        }
        None => println!("{}", view.to_json()?),
    }
    Ok(())
}
