//! Server-sent status stream for a submitted job.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;
use testu_core::correlator::StatusReceiver;
use testu_core::job::JobId;
use testu_core::status::StatusEvent;

use crate::error::AppResult;
use crate::state::AppState;

/// Query parameters for [`status_stream`].
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "jobID")]
    pub job_id: String,
}

/// GET {base}/status?jobID=ID
///
/// Each status event is sent with the status type as the SSE event name and
/// the event as JSON data. The stream ends after `digested` or `failed`.
pub async fn status_stream(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id: JobId = query.job_id.parse()?;
    let receiver = state.dispatcher.open_stream(job_id).await?;
    tracing::info!(%job_id, "Status stream opened");

    Ok(Sse::new(status_events(receiver)).keep_alive(KeepAlive::default()))
}

fn status_events(receiver: StatusReceiver) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        Some((Ok(to_sse(&event)), receiver))
    })
}

fn to_sse(event: &StatusEvent) -> Event {
    let name = event.event_name();
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::warn!(job_id = %event.job_id, error = %e, "Status event not serializable");
            Event::default().event(name).data(event.message.as_str())
        })
}
