use ripple::{
    api::{
        event::{QueryEvent, ResearchEvent},
        types::{QueryRequest, ResearchRequest},
    },
    sse::{Phase, StreamSession},
};
use tokio::sync::mpsc;

async fn wait_closed(session: &StreamSession) -> Option<String> {
    let mut rx = session.subscribe();
    let max_attempts = session.config().max_reconnect_attempts;

    loop {
        let state = rx.borrow_and_update().clone();
        if state.phase == Phase::Closed {
            return state.error;
        }
        log::info!("Connection {}", state.status(max_attempts));

        if rx.changed().await.is_err() {
            return None;
        }
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let query = std::env::args().nth(1).unwrap_or_else(|| {
        println!("Usage: research <design question>");
        std::process::exit(1);
    });

    let client = ripple::client_from_env().unwrap();

    println!("== Query analysis ==");

    let (tx, mut results) = mpsc::unbounded_channel();
    let session = client
        .query(&QueryRequest::new(query.as_str()), move |event| match event {
            QueryEvent::Chunk(text) => print!("{}", text),
            QueryEvent::Result(result) => {
                let _ = tx.send(result);
            }
            QueryEvent::Error(err) => eprintln!("server error: {}", err),
            QueryEvent::End => println!(),
            QueryEvent::Other(event) => log::debug!("Ignore {} event", event.event_type),
        })
        .unwrap();

    if let Some(err) = wait_closed(&session).await {
        eprintln!("query failed: {}", err);
        std::process::exit(2);
    }

    let analysis = match results.recv().await {
        Some(analysis) => analysis,
        None => {
            eprintln!("query stream ended without a result");
            std::process::exit(2);
        }
    };

    println!("{:#}", analysis);
    println!("== Research ==");

    let session = client
        .research(&ResearchRequest::new(query, analysis), |event| match event {
            ResearchEvent::Chunk(text) => print!("{}", text),
            ResearchEvent::Progress(p) => println!("\n[{:>3.0}%]", p),
            ResearchEvent::Status(status) => println!("\n[{}]", status),
            ResearchEvent::NodeComplete { node, .. } => println!("\n[node {} done]", node),
            ResearchEvent::Error(err) => eprintln!("server error: {}", err),
            ResearchEvent::End => println!("\n[complete]"),
            ResearchEvent::Other(event) => log::debug!("Ignore {} event", event.event_type),
        })
        .unwrap();

    if let Some(err) = wait_closed(&session).await {
        eprintln!("research failed: {}", err);
        std::process::exit(2);
    }
}
