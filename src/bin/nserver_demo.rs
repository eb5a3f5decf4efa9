use clap::Parser;
use env_logger::Builder;
use hickory_proto::rr::rdata::{A, AAAA, TXT};
use hickory_proto::rr::RData;
use log::LevelFilter;
use nserver::{
    Container, ErrorClass, HandlerError, HandlerOutcome, Name, QType, Query, Rcode, Record, Response, Server, Settings,
    Transport,
};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::signal;

/// Programmable DNS name server demo: registers the example rules from
/// the design's testable scenarios and serves them over UDP and TCP.
#[derive(Parser, Debug)]
#[command(name = "nserver-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DNS server bind address
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// DNS server bind port
    #[arg(short, long, default_value = "9953")]
    port: u16,

    /// Transport to serve: udp, tcp, or both
    #[arg(short, long, default_value = "both")]
    transport: String,

    /// Number of concurrent UDP worker permits
    #[arg(long, default_value = "1")]
    worker_count: usize,
}

fn a_record(name: &Name, ip: Ipv4Addr) -> Record {
    Record::new(name.clone(), 60, RData::A(A(ip)))
}

fn aaaa_record(name: &Name, ip: Ipv6Addr) -> Record {
    Record::new(name.clone(), 60, RData::AAAA(AAAA(ip)))
}

fn txt_record(name: &Name, text: &str) -> Record {
    Record::new(name.clone(), 60, RData::TXT(TXT::new(vec![text.to_string()])))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let transport = match args.transport.as_str() {
        "udp" => Transport::Udp,
        "tcp" => Transport::Tcp,
        "both" => Transport::Both,
        other => anyhow::bail!("unknown transport {other:?}, expected udp, tcp, or both"),
    };

    let settings = Settings {
        address: args.address.clone(),
        port: args.port,
        transport,
        worker_count: args.worker_count,
        ..Settings::default()
    };

    println!("nserver demo v{}", env!("CARGO_PKG_VERSION"));
    println!("Configuration:");
    println!("  Bind address: {}", settings.address);
    println!("  Bind port: {}", settings.port);
    println!("  Transport: {:?}", settings.transport);
    println!("  Worker count: {}", settings.worker_count);
    println!();

    let server = Server::with_settings("demo", settings);

    // Scenario 1 (spec §8): a static A lookup.
    server.rule(
        "example.com",
        nserver::TypeSet::single(QType::A),
        Arc::new(|q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                Ok::<HandlerOutcome, HandlerError>(a_record(&name, Ipv4Addr::new(1, 2, 3, 4)).into())
            }) as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;

    // Scenario 2 (spec §8): glob fall-through under a registration-ordered
    // pair of rules sharing the `com.au` suffix.
    server.rule(
        "www.*.com.au",
        nserver::TypeSet::single(QType::A),
        Arc::new(|q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                Ok::<HandlerOutcome, HandlerError>(a_record(&name, Ipv4Addr::new(5, 6, 7, 8)).into())
            }) as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;
    server.rule(
        "**.com.au",
        nserver::TypeSet::of([QType::A, QType::AAAA, QType::ANY]),
        Arc::new(|_q: &Query| {
            Box::pin(async { Ok::<HandlerOutcome, HandlerError>(HandlerOutcome::Nothing) })
                as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;

    // Scenario 3 (spec §8): `{base_domain}` substitution.
    server.rule(
        "hello.{base_domain}",
        nserver::TypeSet::single(QType::TXT),
        Arc::new(|q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                let greeting = if name.to_canonical_string().ends_with(".com.au") {
                    "G'day mate"
                } else {
                    "Hello friend"
                };
                Ok::<HandlerOutcome, HandlerError>(txt_record(&name, greeting).into())
            }) as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;

    // Scenario 4 (spec §8): a mounted sub-container with fall-through to a
    // sibling rule on the parent.
    let child: Arc<Container> = Container::new("ns1-example-com");
    child.rule(
        "www.example.com",
        nserver::TypeSet::single(QType::A),
        Arc::new(|q: &Query| {
            let name = q.name.clone();
            Box::pin(async move {
                Ok::<HandlerOutcome, HandlerError>(aaaa_record(&name, Ipv6Addr::LOCALHOST).into())
            }) as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;
    server.mount(
        child,
        nserver::Matcher::parse_zone("example.com")?,
        nserver::TypeSet::all(),
        false,
    )?;
    server.rule(
        "example.com",
        nserver::TypeSet::single(QType::NS),
        Arc::new(|_q: &Query| {
            Box::pin(async { Ok::<HandlerOutcome, HandlerError>(HandlerOutcome::Nothing) })
                as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;

    // Scenario 6 (spec §8): exception dispatch by error class. The handler
    // raises `NotImplemented`; the registered exception handler below turns
    // that into a NOTIMP reply instead of falling through to the default
    // SERVFAIL handler.
    server.rule(
        "broken.example.com",
        nserver::TypeSet::all(),
        Arc::new(|_q: &Query| {
            Box::pin(async { Err(HandlerError::not_implemented("demo: not implemented")) })
                as nserver::handler::BoxFuture<'static, Result<HandlerOutcome, HandlerError>>
        }),
    )?;
    server.exception_handler(
        ErrorClass::NotImplemented,
        Arc::new(|_error: HandlerError, _query: Query| {
            Box::pin(async { Response::with_rcode(Rcode::NotImp) }) as nserver::handler::BoxFuture<'static, Response>
        }),
    );

    println!("Server starting. Press Ctrl+C to stop.\n");

    tokio::select! {
        result = server.run() => result,
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received, stopping server...");
            Ok(())
        }
    }
}
