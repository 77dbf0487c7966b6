//! Instance listing across pages

use std::collections::HashSet;

use tracing::debug;
use vmreaper_models::InstanceRecord;

use crate::error::ReaperError;
use crate::provider::{ControlPlane, ListScope, ProviderError};

/// Enumerates compute instances for a subscription
pub struct ResourceDirectory<'a, C> {
    control: &'a C,
}

impl<'a, C: ControlPlane> ResourceDirectory<'a, C> {
    pub fn new(control: &'a C) -> Self {
        Self { control }
    }

    /// All instances in the subscription
    pub async fn list_all(&self) -> Result<Vec<InstanceRecord>, ReaperError> {
        self.list(&ListScope::Subscription).await
    }

    /// All instances in one resource group
    pub async fn list_in_group(&self, group: &str) -> Result<Vec<InstanceRecord>, ReaperError> {
        self.list(&ListScope::ResourceGroup(group.to_string())).await
    }

    /// Follow continuation cursors until the provider returns none.
    ///
    /// A failed page discards everything fetched so far; callers never see a
    /// partial population.
    pub async fn list(&self, scope: &ListScope) -> Result<Vec<InstanceRecord>, ReaperError> {
        let mut instances = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self
                .control
                .list_instances(scope, cursor.as_deref())
                .await
                .map_err(|source| ReaperError::Retrieval {
                    scope: scope.to_string(),
                    source,
                })?;
            pages += 1;

            let next = page.continuation().map(str::to_string);
            debug!(%scope, page = pages, items = page.items.len(), more = next.is_some(), "Fetched instance page");
            instances.extend(page.items);

            match next {
                // A cursor handed out twice would restart a cycle
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(ReaperError::Retrieval {
                        scope: scope.to_string(),
                        source: ProviderError::StalledCursor { cursor: next },
                    });
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(%scope, pages, total = instances.len(), "Instance listing complete");
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Page;
    use crate::testing::{instance, Call, CallLog, FakeControlPlane};

    fn three_pages() -> Vec<Page<InstanceRecord>> {
        vec![
            Page::with_cursor(vec![instance("web-01", "g1"), instance("web-02", "g1")], "page-1"),
            Page::with_cursor(vec![instance("db-01", "g2")], "page-2"),
            Page::last(vec![instance("cache-01", "g3")]),
        ]
    }

    #[tokio::test]
    async fn test_list_all_concatenates_pages() {
        let log = CallLog::default();
        let control = FakeControlPlane::with_pages(&log, three_pages());

        let all = ResourceDirectory::new(&control).list_all().await.unwrap();

        let names: Vec<_> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["web-01", "web-02", "db-01", "cache-01"]);

        let cursors: Vec<_> = log
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::ListInstances { cursor, .. } => cursor,
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(cursors, vec![None, Some("page-1".to_string()), Some("page-2".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_cursor_terminates() {
        let log = CallLog::default();
        let control = FakeControlPlane::with_pages(
            &log,
            vec![Page::with_cursor(vec![instance("web-01", "g1")], "")],
        );

        let all = ResourceDirectory::new(&control).list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(log.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_list_in_group_uses_group_scope() {
        let log = CallLog::default();
        let control = FakeControlPlane::with_pages(&log, vec![Page::last(vec![instance("web-01", "g1")])]);

        ResourceDirectory::new(&control).list_in_group("g1").await.unwrap();

        assert_eq!(
            log.calls(),
            vec![Call::ListInstances {
                scope: ListScope::ResourceGroup("g1".to_string()),
                cursor: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_page_failure_discards_partial_results() {
        let log = CallLog::default();
        let mut control = FakeControlPlane::with_pages(&log, three_pages());
        control.fail_page = Some(2);

        let err = ResourceDirectory::new(&control).list_all().await.unwrap_err();
        assert!(matches!(err, ReaperError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_stalled_cursor_is_an_error() {
        let log = CallLog::default();
        let control = FakeControlPlane::with_pages(
            &log,
            vec![
                Page::with_cursor(vec![instance("web-01", "g1")], "page-1"),
                Page::with_cursor(vec![instance("web-02", "g1")], "page-1"),
            ],
        );

        let err = ResourceDirectory::new(&control).list_all().await.unwrap_err();
        assert!(matches!(
            err,
            ReaperError::Retrieval {
                source: ProviderError::StalledCursor { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cycling_cursor_is_an_error() {
        let log = CallLog::default();
        let control = FakeControlPlane::with_pages(
            &log,
            vec![
                Page::with_cursor(vec![instance("web-01", "g1")], "page-1"),
                Page::with_cursor(vec![instance("web-02", "g1")], "page-2"),
                Page::with_cursor(vec![instance("web-03", "g1")], "page-1"),
            ],
        );

        let err = ResourceDirectory::new(&control).list_all().await.unwrap_err();
        assert!(matches!(
            err,
            ReaperError::Retrieval {
                source: ProviderError::StalledCursor { ref cursor },
                ..
            } if cursor == "page-1"
        ));
        assert_eq!(log.calls().len(), 3);
    }
}
