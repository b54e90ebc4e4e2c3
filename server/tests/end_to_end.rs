use jobpoll::{
    ApiClient, AsyncJobPoller, ChannelNotifier, JobError, NotificationKind, PollInterval,
    Session, SubscriptionState, TransportError,
};
use jobpoll_server::{app, state::AppState};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

async fn spawn_server(session_key: Option<&str>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(AppState::new(session_key.map(str::to_string)), None);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/api")).unwrap()
}

fn client(url: Url, session_key: Option<&str>) -> ApiClient {
    let mut session = Session::new(url);
    session.session_key = session_key.map(str::to_string);
    ApiClient::new(session, Duration::from_secs(5)).unwrap()
}

fn fast() -> Option<PollInterval> {
    Some(PollInterval::from_millis(20).unwrap())
}

#[tokio::test]
async fn submit_then_wait_for_success() {
    let url = spawn_server(None).await;
    let client = client(url, None);

    let job_id = client
        .submit_command(
            "simulateAsyncJob",
            [("durationMs", "100"), ("message", "snapshot taken")],
        )
        .await
        .unwrap();

    let poller = AsyncJobPoller::new(client);
    let result = poller.wait(job_id, fast()).await.unwrap();
    assert_eq!(result["simulation"]["message"], "snapshot taken");
}

#[tokio::test]
async fn callbacks_fire_once_for_backend_failure() {
    let url = spawn_server(None).await;
    let client = client(url, None);
    let job_id = client
        .submit_command(
            "simulateAsyncJob",
            [("durationMs", "60"), ("outcome", "failure"), ("message", "quota exceeded")],
        )
        .await
        .unwrap();

    let (notifier, mut notifications) = ChannelNotifier::new();
    let poller = AsyncJobPoller::new(client).with_notifier(notifier);
    let (tx, rx) = oneshot::channel();
    let sub = poller.submit(
        job_id,
        fast(),
        |_| panic!("job should not succeed"),
        move |e: JobError| {
            let _ = tx.send(e);
        },
    );

    let err = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(err.is_backend_failure());
    assert_eq!(err.error_text(), "quota exceeded");
    assert_eq!(sub.state(), SubscriptionState::Failed);

    let ticks = sub.ticks();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sub.ticks(), ticks);

    let n = notifications.recv().await.unwrap();
    assert_eq!(n.kind, NotificationKind::Failed);
}

#[tokio::test]
async fn unknown_job_is_a_transport_failure() {
    let url = spawn_server(None).await;
    let poller = AsyncJobPoller::new(client(url, None));

    let err = poller.wait("no-such-job", fast()).await.unwrap_err();
    match err {
        JobError::Transport(TransportError::Api { status, code, .. }) => {
            assert_eq!(status, 431);
            assert_eq!(code, Some(431));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn session_key_travels_with_every_call() {
    let url = spawn_server(Some("k3y")).await;

    let rejected = client(url.clone(), None)
        .submit_command("simulateAsyncJob", [("durationMs", "10")])
        .await
        .unwrap_err();
    assert!(matches!(rejected, TransportError::Api { status: 401, .. }));

    let client = client(url, Some("k3y"));
    let job_id = client
        .submit_command("simulateAsyncJob", [("durationMs", "10")])
        .await
        .unwrap();
    let poller = AsyncJobPoller::new(client);
    assert!(poller.wait(job_id, fast()).await.is_ok());
}
