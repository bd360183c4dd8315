//! Progress UI (one bar per download) driven by the tracker's item stream.

use std::collections::HashMap;

use bulkfetch_core::{DownloadItem, DownloadList, DownloadStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::watch;

const BAR_TEMPLATE: &str = "{prefix:32!} [{bar:30}] {percent:>3}% {msg}";

/// Renders `items` until every download has settled.
///
/// With `draw` false the bars are hidden but the wait is the same.
pub(crate) async fn follow_downloads(mut items: watch::Receiver<DownloadList>, draw: bool) {
    let multi = if draw {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    };
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    loop {
        let snapshot = items.borrow_and_update().clone();
        for item in snapshot.iter() {
            let bar = bars.entry(item.file_name.clone()).or_insert_with(|| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(item.display_name.clone());
                bar
            });
            render(bar, item);
        }
        if all_settled(&snapshot) {
            break;
        }
        if items.changed().await.is_err() {
            break;
        }
    }
}

fn render(bar: &ProgressBar, item: &DownloadItem) {
    if bar.is_finished() {
        return;
    }
    bar.set_position(u64::from(item.percentage()));
    let message = status_message(item);
    match item.status {
        DownloadStatus::Downloading | DownloadStatus::Unzipping => bar.set_message(message),
        DownloadStatus::Completed => bar.finish_with_message(message),
        DownloadStatus::Failed | DownloadStatus::Stopped => bar.abandon_with_message(message),
    }
}

/// Short status text shown after the bar.
pub(crate) fn status_message(item: &DownloadItem) -> String {
    match item.status {
        DownloadStatus::Downloading => format!("{:.2} MB/s", item.download_speed_mbs),
        DownloadStatus::Unzipping => "extracting".to_string(),
        DownloadStatus::Completed => "done".to_string(),
        DownloadStatus::Failed => "failed".to_string(),
        DownloadStatus::Stopped => "stopped".to_string(),
    }
}

/// True once no item is downloading or extracting.
pub(crate) fn all_settled(items: &[DownloadItem]) -> bool {
    items.iter().all(|item| item.status.is_terminal())
}
