use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use log::{error, info};

use crate::data::{SolveRequest, TimetableInput, TimetableOutput};
use crate::error::TimetableError;
use crate::solver;

async fn solve_handler(
    Json(request): Json<SolveRequest>,
) -> Result<(StatusCode, Json<TimetableOutput>), (StatusCode, String)> {
    let SolveRequest { input, solver: options } = request;
    let input = input.unwrap_or_else(|| TimetableInput::default_catalog(false));

    // the search is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || solver::solve(&input, &options))
        .await
        .map_err(|e| {
            error!("Solver task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match result {
        Ok(output) if output.is_solved() => Ok((StatusCode::OK, Json(output))),
        Ok(output) => Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(output))),
        Err(e @ TimetableError::Config(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub fn router() -> Router {
    Router::new().route("/v1/timetable/solve", post(solve_handler))
}

pub async fn run_server(bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::full_week_input;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post_json(body: Value) -> (StatusCode, Vec<u8>) {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/timetable/solve")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_solve_returns_timetable() {
        let body = json!({
            "input": full_week_input(),
            "solver": {"timeLimitMs": 60000, "workers": 1}
        });
        let (status, bytes) = post_json(body).await;
        assert_eq!(status, StatusCode::OK);

        let output: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(output["status"], "solved");
        assert_eq!(output["timetable"]["A"]["Mon"]["1"]["course"], "MATH");
        assert_eq!(output["courseTotals"]["B"]["HIST"], 4);
        assert_eq!(output["teacherWorkload"]["Mr. Rao"], 12);
    }

    #[tokio::test]
    async fn test_default_catalog_without_free_periods_is_unprocessable() {
        let (status, bytes) = post_json(json!({})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let output: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(output["status"], "infeasible");
        assert!(output["timetable"].is_null());
    }

    #[tokio::test]
    async fn test_config_error_is_bad_request() {
        let mut input = full_week_input();
        input.fixed_slots.push(crate::data::FixedSlot::new(
            "C",
            crate::data::Day::Mon,
            1,
            "MATH",
        ));
        let (status, bytes) = post_json(json!({ "input": input })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(bytes).unwrap().contains("(C, Mon, 1, MATH)"));
    }

    #[tokio::test]
    async fn test_oversized_lab_quota_is_bad_request() {
        let mut input = full_week_input();
        input.courses.push(crate::data::CourseSpec::new(
            "BIG_LAB",
            1 << 31,
            crate::data::CourseCategory::Lab,
            crate::data::Teacher::named("Ms. Menon"),
        ));
        let (status, bytes) = post_json(json!({ "input": input })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(bytes).unwrap().contains("BIG_LAB"));
    }
}
