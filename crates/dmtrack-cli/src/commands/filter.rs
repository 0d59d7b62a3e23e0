//! Filter command: show or edit the chat filter stored in the snapshot.

use anyhow::{Context, Result, bail};
use dmtrack::{Consumer, FilterConfig, SnapshotChannel};

use super::read_live;
use crate::cli::FilterAction;
use crate::render::filter_line;

/// Apply `action` to the live filter and return the filter as stored afterwards
pub fn apply<C, F>(consumer: &mut Consumer<C, F>, action: &FilterAction) -> Result<FilterConfig>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let updated = match action {
        FilterAction::Show => return Ok(read_live(consumer)?.filter()),
        FilterAction::Enable => consumer.update_filter(|f| f.enabled = true),
        FilterAction::Disable => consumer.update_filter(|f| f.enabled = false),
        FilterAction::Terms { terms } => {
            let terms = FilterConfig::parse_terms(terms);
            if terms.is_empty() {
                bail!("no filter terms given");
            }
            consumer.update_filter(move |f| f.terms = terms)
        }
        FilterAction::Regex { on } => consumer.update_filter(|f| f.use_regex = *on),
        FilterAction::Tagged { on } => consumer.update_filter(|f| f.block_tagged = *on),
        FilterAction::Defaults => {
            consumer.update_filter(|f| f.terms = FilterConfig::default().terms)
        }
    };
    updated.context("could not update the filter (is the agent running?)")
}

pub fn run<C, F>(consumer: &mut Consumer<C, F>, action: Option<FilterAction>) -> Result<()>
where
    C: SnapshotChannel,
    F: FnMut() -> dmtrack::Result<C>,
{
    let action = action.unwrap_or(FilterAction::Show);
    let filter = apply(consumer, &action)?;
    println!("{}", filter_line(&filter));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{TIMEOUT, live_pair};

    #[test]
    fn test_enable_and_terms() {
        let (publisher, mut consumer) = live_pair();

        let filter = apply(&mut consumer, &FilterAction::Enable).unwrap();
        assert!(filter.enabled);

        let filter = apply(
            &mut consumer,
            &FilterAction::Terms {
                terms: " gold , , boost ".into(),
            },
        )
        .unwrap();
        assert_eq!(filter.terms, vec!["gold", "boost"]);
        assert!(filter.enabled);

        // The producer sees the consumer's edit
        let seen = publisher.read_filter(TIMEOUT).unwrap();
        assert_eq!(seen, filter);
    }

    #[test]
    fn test_flags_and_defaults() {
        let (_publisher, mut consumer) = live_pair();
        apply(&mut consumer, &FilterAction::Terms { terms: "x".into() }).unwrap();
        apply(&mut consumer, &FilterAction::Regex { on: true }).unwrap();
        let filter = apply(&mut consumer, &FilterAction::Tagged { on: true }).unwrap();
        assert!(filter.use_regex && filter.block_tagged);

        let filter = apply(&mut consumer, &FilterAction::Defaults).unwrap();
        assert_eq!(filter.terms, FilterConfig::default().terms);
        assert!(filter.use_regex);
    }

    #[test]
    fn test_empty_terms_rejected() {
        let (_publisher, mut consumer) = live_pair();
        assert!(apply(&mut consumer, &FilterAction::Terms { terms: " , ".into() }).is_err());
        assert_eq!(
            apply(&mut consumer, &FilterAction::Show).unwrap().terms,
            FilterConfig::default().terms
        );
    }

    #[test]
    fn test_edit_after_producer_exit_fails() {
        let (publisher, mut consumer) = live_pair();
        drop(publisher);
        assert!(apply(&mut consumer, &FilterAction::Enable).is_err());
    }
}
