#![cfg(all(unix, feature = "http", feature = "client"))]

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use spice_api::{
    ApiHandler, FilesResponse, HttpApi, Metrics, RunRequest, RunResponse, ServerConfig, SimClient,
    SimServer, archive,
};
use spice_exec::{ConsoleOutput, Shell, Simulator, SimulatorConfig};

const OK: &str = "echo raw > \"$2\"\necho log > \"$3\"\n";

fn scratch(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spice-e2e-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn count_ext(dir: &Path, ext: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == ext)
        })
        .count()
}

fn entries(zip: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(zip).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

struct Harness {
    base: String,
    server: Arc<SimServer>,
    out: PathBuf,
}

async fn serve() -> Harness {
    let out = scratch("server");
    let sim = Simulator::from_backend(
        Shell,
        SimulatorConfig::default().with_console(ConsoleOutput::Discard),
    )
    .unwrap();
    let cfg = ServerConfig {
        output_folder: out.clone(),
        parallel_sims: 2,
        timeout: Some(Duration::from_secs(10)),
        poll_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let server = SimServer::new(sim, cfg).unwrap();
    let app = HttpApi::new(Arc::clone(&server))
        .with_metrics(Arc::new(Metrics::new().unwrap()))
        .router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        spice_api::axum::serve(listener, app).await.unwrap();
    });

    Harness {
        base: format!("http://{addr}"),
        server,
        out,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn run_round_trip() {
    let h = serve().await;
    let local = scratch("client");
    let circuit = write(&local, "rc.net", OK);

    let mut client = SimClient::connect(&h.base).await.unwrap();
    let run = client.run(&circuit, &[]).await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(10), client.next_finished())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished, Some(run));

    let zip = client.get_run_data(run, None).await.unwrap().unwrap();
    assert_eq!(zip, local.join(format!("rc_{run}.zip")));
    assert_eq!(
        entries(&zip),
        vec![format!("rc_{run}.log"), format!("rc_{run}.raw")]
    );

    // Delivered once; the server kept nothing.
    assert!(client.get_run_data(run, None).await.unwrap().is_none());
    assert_eq!(count_ext(&h.out, "raw"), 0);
    assert_eq!(count_ext(&h.out, "zip"), 0);
    assert!(client.next_finished().await.unwrap().is_none());

    assert!(client.close_session().await.unwrap());
    h.server.shutdown().await;
    assert!(!h.server.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn dependencies_and_sources_are_unpacked() {
    let h = serve().await;
    let local = scratch("client");
    let shared = write(&local, "shared.txt", "from sources\n");
    let dep = write(&local, "stimulus.txt", "from dependency\n");
    let circuit = write(
        &local,
        "tb.net",
        "cat shared.txt stimulus.txt > \"$2\"\necho log > \"$3\"\n",
    );

    let mut client = SimClient::connect(&h.base).await.unwrap();
    assert!(client.add_sources(&[shared]).await.unwrap());
    let run = client.run(&circuit, &[dep]).await.unwrap();
    assert_eq!(client.next_finished().await.unwrap(), Some(run));

    let dest = scratch("fetch");
    let zip = client.get_run_data(run, Some(&dest)).await.unwrap().unwrap();
    let unpacked = archive::unpack(&std::fs::read(&zip).unwrap(), &dest).unwrap();
    let raw = unpacked.iter().find(|p| p.extension().is_some_and(|e| e == "raw")).unwrap();
    assert_eq!(
        std::fs::read_to_string(raw).unwrap(),
        "from sources\nfrom dependency\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_run_still_delivers_its_log() {
    let h = serve().await;
    let local = scratch("client");
    let circuit = write(&local, "bad.net", "echo oops > \"$3\"\nexit 3\n");

    let mut client = SimClient::connect(&h.base).await.unwrap();
    let run = client.run(&circuit, &[]).await.unwrap();
    assert_eq!(client.next_finished().await.unwrap(), Some(run));

    let zip = client.get_run_data(run, None).await.unwrap().unwrap();
    assert_eq!(entries(&zip), vec![format!("bad_{run}.fail")]);
    assert_eq!(h.server.stats().failed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_session_removes_outstanding_runs() {
    let h = serve().await;
    let local = scratch("client");
    let circuit = write(&local, "rc.net", OK);

    let mut client = SimClient::connect(&h.base).await.unwrap();
    client.run(&circuit, &[]).await.unwrap();
    client.run(&circuit, &[]).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while client.status().await.unwrap().len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "runs never finished");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(count_ext(&h.out, "raw"), 2);
    assert_eq!(count_ext(&h.out, "zip"), 2);

    let token = client.session().to_string();
    assert!(client.close_session().await.unwrap());
    assert_eq!(count_ext(&h.out, "raw"), 0);
    assert_eq!(count_ext(&h.out, "zip"), 0);

    let http = reqwest::Client::new();
    let status = http
        .get(format!("{}/api/v1/sessions/{token}/status", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(status.status().as_u16(), 404);

    let files: FilesResponse = http
        .get(format!("{}/api/v1/sessions/{token}/runs/1/files", h.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(files.name.is_empty() && files.archive.is_empty());
    assert!(!h.server.close_session(&token).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_gets_minus_one() {
    let h = serve().await;
    let local = scratch("client");
    let circuit = write(&local, "rc.net", OK);

    let resp: RunResponse = reqwest::Client::new()
        .post(format!("{}/api/v1/sessions/nope/runs", h.base))
        .json(&RunRequest {
            circuit: "rc.net".into(),
            archive: archive::pack(&[circuit.as_path()]).unwrap(),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp.run, -1);
    assert_eq!(h.server.stats().submitted, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn introspection_endpoints() {
    let h = serve().await;
    let http = reqwest::Client::new();

    let health = http.get(format!("{}/healthz", h.base)).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");

    let client = SimClient::connect(&h.base).await.unwrap();
    let info = client.server_info().await.unwrap();
    assert!(info.running);
    assert_eq!(info.simulator, "shell");
    assert_eq!(info.sessions, 1);
    assert!(info.methods.iter().any(|m| m == "get_files"));

    let metrics = http
        .get(format!("{}/metrics", h.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("spice_tasks_submitted_total 0"));
    assert!(metrics.contains("spice_sessions 1"));
}
