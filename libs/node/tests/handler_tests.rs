use async_trait::async_trait;
use conduit_core::{CallOptions, Metadata, StatusCode, ACCEPT_ENCODING_HEADER, ENCODING_HEADER};
use conduit_fabric::{
    codec::{BincodeCodec, RawCodec},
    CompressionProvider, CompressionRegistry, Framer,
};
use conduit_fabric::channel::Channel;
use conduit_node::{
    reply, Activate, ActivationArgs, Argument, Error, Interceptor, InterceptorCollection, Method,
    MethodType, Next, Reply, RequestStream, Result, Router, ServerCall, ServerCallContext,
    ServerCallHandler, ServiceCollection, ServiceOptions, ServiceProvider, Status, StreamWriter,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const BUFFER: usize = 64 * 1024;

#[derive(Default)]
struct Stats {
    created: AtomicUsize,
    disposed: AtomicUsize,
}

impl Stats {
    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

struct Worker {
    stats: Arc<Stats>,
}

impl Activate for Worker {
    fn activate(args: &mut ActivationArgs<'_>) -> Result<Self> {
        let stats = args.next::<Stats>()?;
        stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Self { stats })
    }

    fn dispose(&self) {
        self.stats.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Flips every bit; stands in for a real codec
struct XorCodec;

impl CompressionProvider for XorCodec {
    fn encoding_name(&self) -> &str {
        "xor"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ 0xff).collect())
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ 0xff).collect())
    }
}

fn provider(stats: &Arc<Stats>) -> Arc<dyn ServiceProvider> {
    Arc::new(ServiceCollection::new().add_shared(stats.clone()).build())
}

fn raw_method(method_type: MethodType) -> Method<Vec<u8>, Vec<u8>> {
    Method::new(method_type, "test.Worker", "Run", RawCodec, RawCodec)
}

fn counting_method(method_type: MethodType) -> Method<u32, String> {
    Method::new(method_type, "test.Counter", "Count", BincodeCodec, BincodeCodec)
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0];
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// A call whose request stream holds `request` and is then closed
async fn raw_call(request: &[u8]) -> (ServerCall, DuplexStream) {
    let (mut client_tx, server_rx) = tokio::io::duplex(BUFFER);
    let (server_tx, client_rx) = tokio::io::duplex(BUFFER);

    client_tx.write_all(request).await.unwrap();
    drop(client_tx);

    (ServerCall::new(server_rx, server_tx), client_rx)
}

async fn read_all(mut stream: DuplexStream) -> Vec<u8> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.unwrap();
    bytes
}

fn connect(framer: Framer) -> (Channel<DuplexStream, DuplexStream>, ServerCall) {
    let (client_tx, server_rx) = tokio::io::duplex(BUFFER);
    let (server_tx, client_rx) = tokio::io::duplex(BUFFER);
    (
        Channel::new(client_rx, client_tx, framer),
        ServerCall::new(server_rx, server_tx),
    )
}

fn trimming_handler(
    options: &ServiceOptions,
    stats: &Arc<Stats>,
) -> ServerCallHandler<Worker, Vec<u8>, Vec<u8>> {
    ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        options,
        provider(stats),
        |_worker: Arc<Worker>, request: Vec<u8>, _context| async move {
            Ok(request.iter().take(7).copied().collect::<Vec<u8>>())
        },
    )
    .unwrap()
}

#[tokio::test]
async fn unary_call_frames_request_and_response() {
    let stats = Arc::new(Stats::default());
    let handler = trimming_handler(&ServiceOptions::default(), &stats);

    let (call, client_rx) = raw_call(&frame(b"0123456789")).await;
    let outcome = handler.handle_call(call).await;

    assert!(outcome.status.is_ok());
    assert!(outcome.response_headers.is_empty());
    assert_eq!(read_all(client_rx).await, frame(b"0123456"));
    assert_eq!(stats.created(), 1);
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test]
async fn unary_call_without_request_is_internal() {
    let stats = Arc::new(Stats::default());
    let handler = trimming_handler(&ServiceOptions::default(), &stats);

    let (call, client_rx) = raw_call(&[]).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(outcome.status, Status::internal("Request did not contain a message."));
    assert!(read_all(client_rx).await.is_empty());
    assert_eq!(stats.created(), 0);
}

#[tokio::test]
async fn oversized_request_is_rejected_before_invocation() {
    let stats = Arc::new(Stats::default());
    let options = ServiceOptions::builder()
        .max_receive_message_size(Some(4))
        .build();
    let handler = trimming_handler(&options, &stats);

    let (call, _client_rx) = raw_call(&frame(b"0123456789")).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(outcome.status.code(), StatusCode::ResourceExhausted);
    assert_eq!(
        outcome.status.message(),
        "Received message exceeds the maximum configured message size."
    );
    assert_eq!(stats.created(), 0);
}

#[tokio::test]
async fn trailing_request_bytes_fail_the_call() {
    let stats = Arc::new(Stats::default());
    let handler = trimming_handler(&ServiceOptions::default(), &stats);

    let mut request = frame(b"0123456789");
    request.push(0);
    let (call, _client_rx) = raw_call(&request).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(
        outcome.status,
        Status::internal("Unexpected data after finished reading message.")
    );
}

#[tokio::test]
async fn service_status_is_returned_and_instance_released() {
    let stats = Arc::new(Stats::default());
    let handler: ServerCallHandler<Worker, Vec<u8>, Vec<u8>> = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, _request: Vec<u8>, _context| async move {
            Err(Error::from(Status::not_found("no such item")))
        },
    )
    .unwrap();

    let (call, client_rx) = raw_call(&frame(b"abc")).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(outcome.status, Status::not_found("no such item"));
    assert!(read_all(client_rx).await.is_empty());
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test]
async fn other_service_errors_are_unknown() {
    let stats = Arc::new(Stats::default());
    let failing = |_worker: Arc<Worker>, _request: Vec<u8>, _context: ServerCallContext| async move {
        Err::<Vec<u8>, _>(Error::custom("disk on fire"))
    };

    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &ServiceOptions::default(),
        provider(&stats),
        failing,
    )
    .unwrap();
    let (call, _client_rx) = raw_call(&frame(b"abc")).await;
    assert_eq!(
        handler.handle_call(call).await.status,
        Status::unknown("Exception was thrown by handler.")
    );

    let detailed = ServiceOptions::builder().enable_detailed_errors(true).build();
    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &detailed,
        provider(&stats),
        failing,
    )
    .unwrap();
    let (call, _client_rx) = raw_call(&frame(b"abc")).await;
    assert_eq!(
        handler.handle_call(call).await.status,
        Status::unknown("Exception was thrown by handler. disk on fire")
    );
}

#[tokio::test]
async fn service_resolved_from_container_is_not_disposed() {
    let stats = Arc::new(Stats::default());
    let worker = Arc::new(Worker {
        stats: stats.clone(),
    });
    let provider: Arc<dyn ServiceProvider> = Arc::new(
        ServiceCollection::new()
            .add_shared(stats.clone())
            .add_shared(worker.clone())
            .build(),
    );

    let seen = worker.clone();
    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &ServiceOptions::default(),
        provider,
        move |worker: Arc<Worker>, request: Vec<u8>, _context| {
            let same = Arc::ptr_eq(&worker, &seen);
            async move {
                assert!(same);
                Ok(request)
            }
        },
    )
    .unwrap();

    let (call, _client_rx) = raw_call(&frame(b"abc")).await;
    assert!(handler.handle_call(call).await.status.is_ok());
    assert_eq!(stats.created(), 0);
    assert_eq!(stats.disposed(), 0);
}

#[tokio::test]
async fn server_streaming_writes_every_response() {
    let stats = Arc::new(Stats::default());
    let handler = ServerCallHandler::server_streaming(
        counting_method(MethodType::ServerStreaming),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, count: u32, mut responses: StreamWriter<String>, _context| async move {
            for i in 0..count {
                responses.write(&format!("item {}", i)).await?;
            }
            assert_eq!(responses.messages_sent(), count as usize);
            Ok(())
        },
    )
    .unwrap();

    let (mut client, call) = connect(Framer::new());
    let options = CallOptions::new();
    client.send(&3u32, &BincodeCodec, &options).await.unwrap();
    client.finish_sending().await.unwrap();

    let outcome = handler.handle_call(call).await;
    assert!(outcome.status.is_ok());

    let mut received = Vec::new();
    while let Some(item) = client.receive::<String, _>(&BincodeCodec, &options).await.unwrap() {
        received.push(item);
    }
    assert_eq!(received, vec!["item 0", "item 1", "item 2"]);
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test]
async fn writer_outliving_the_call_cannot_send() {
    let stats = Arc::new(Stats::default());
    let resume = Arc::new(Notify::new());
    let late_write: Arc<Mutex<Option<JoinHandle<Result<()>>>>> = Arc::new(Mutex::new(None));

    let handler = {
        let resume = resume.clone();
        let late_write = late_write.clone();
        ServerCallHandler::server_streaming(
            counting_method(MethodType::ServerStreaming),
            &ServiceOptions::default(),
            provider(&stats),
            move |_worker: Arc<Worker>, _count: u32, mut responses: StreamWriter<String>, _context| {
                let resume = resume.clone();
                let late_write = late_write.clone();
                async move {
                    let task = tokio::spawn(async move {
                        resume.notified().await;
                        responses.write(&"late".to_string()).await
                    });
                    *late_write.lock().unwrap() = Some(task);
                    Err(Error::from(Status::permission_denied("not allowed")))
                }
            },
        )
        .unwrap()
    };

    let (mut client, call) = connect(Framer::new());
    let caller = CallOptions::new();
    client.send(&1u32, &BincodeCodec, &caller).await.unwrap();
    client.finish_sending().await.unwrap();

    let outcome = handler.handle_call(call.with_options(caller.clone())).await;
    assert_eq!(outcome.status.code(), StatusCode::PermissionDenied);
    assert!(!caller.cancellation().is_cancelled());

    resume.notify_one();
    let task = late_write.lock().unwrap().take().unwrap();
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidOperation(ref msg) if msg == "Cannot write message after request is complete."
    ));

    let received = client.receive::<String, _>(&BincodeCodec, &caller).await.unwrap();
    assert_eq!(received, None);
}

#[test]
fn handler_must_match_declared_method_type() {
    let stats = Arc::new(Stats::default());
    let err = ServerCallHandler::<Worker, Vec<u8>, Vec<u8>>::unary(
        raw_method(MethodType::ServerStreaming),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, request: Vec<u8>, _context| async move { Ok(request) },
    )
    .err()
    .unwrap();

    assert!(matches!(
        err,
        Error::InvalidOperation(ref msg) if msg.contains("/test.Worker/Run")
    ));
}

#[tokio::test]
async fn client_streaming_reads_until_end_of_stream() {
    let stats = Arc::new(Stats::default());
    let handler = ServerCallHandler::client_streaming(
        counting_method(MethodType::ClientStreaming),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, mut requests: RequestStream<u32>, _context| async move {
            let mut total = 0;
            while let Some(value) = requests.message().await? {
                total += value;
            }
            Ok(format!("total {}", total))
        },
    )
    .unwrap();

    let (mut client, call) = connect(Framer::new());
    let options = CallOptions::new();
    for value in [1u32, 2, 3, 4] {
        client.send(&value, &BincodeCodec, &options).await.unwrap();
    }
    client.finish_sending().await.unwrap();

    let outcome = handler.handle_call(call).await;
    assert!(outcome.status.is_ok());

    let response: Option<String> = client.receive_single(&BincodeCodec, &options).await.unwrap();
    assert_eq!(response.as_deref(), Some("total 10"));
}

#[tokio::test]
async fn duplex_streaming_answers_each_request() {
    let stats = Arc::new(Stats::default());
    let handler = ServerCallHandler::duplex_streaming(
        counting_method(MethodType::DuplexStreaming),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>,
         mut requests: RequestStream<u32>,
         mut responses: StreamWriter<String>,
         _context| async move {
            while let Some(value) = requests.message().await? {
                responses.write(&format!("{}", value * 2)).await?;
            }
            Ok(())
        },
    )
    .unwrap();

    let (mut client, call) = connect(Framer::new());
    let options = CallOptions::new();

    let exchange = async {
        let mut answers = Vec::new();
        for value in [5u32, 6, 7] {
            client.send(&value, &BincodeCodec, &options).await.unwrap();
            let answer: Option<String> = client.receive(&BincodeCodec, &options).await.unwrap();
            answers.extend(answer);
        }
        client.finish_sending().await.unwrap();
        let end: Option<String> = client.receive(&BincodeCodec, &options).await.unwrap();
        assert!(end.is_none());
        answers
    };

    let (outcome, answers) = tokio::join!(handler.handle_call(call), exchange);
    assert!(outcome.status.is_ok());
    assert_eq!(answers, vec!["10", "12", "14"]);
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_invocation_and_releases_instance() {
    let stats = Arc::new(Stats::default());
    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, request: Vec<u8>, _context| async move {
            futures::future::pending::<()>().await;
            Ok(request)
        },
    )
    .unwrap();

    let options = CallOptions::new();
    let (call, client_rx) = raw_call(&frame(b"abc")).await;
    let call = call.with_options(options.clone());

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        options.cancel();
    };
    let (outcome, ()) = tokio::join!(handler.handle_call(call), cancel);

    assert_eq!(outcome.status.code(), StatusCode::Cancelled);
    assert!(read_all(client_rx).await.is_empty());
    assert_eq!(stats.created(), 1);
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_aborts_invocation() {
    let stats = Arc::new(Stats::default());
    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &ServiceOptions::default(),
        provider(&stats),
        |_worker: Arc<Worker>, request: Vec<u8>, _context| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(request)
        },
    )
    .unwrap();

    let (call, _client_rx) = raw_call(&frame(b"abc")).await;
    let call = call.with_options(CallOptions::new().with_timeout(Duration::from_millis(100)));
    let outcome = handler.handle_call(call).await;

    assert_eq!(outcome.status.code(), StatusCode::DeadlineExceeded);
    assert_eq!(stats.disposed(), 1);
}

#[tokio::test]
async fn compressed_request_and_negotiated_response() {
    let stats = Arc::new(Stats::default());
    let registry = Arc::new(CompressionRegistry::builder().provider(XorCodec).build());
    let options = ServiceOptions::builder()
        .compression(registry.clone())
        .response_compression("xor")
        .build();
    let handler = trimming_handler(&options, &stats);

    let framer = Framer::builder().compression(registry).build();
    let (client, call) = connect(framer);
    let mut client = client.with_encoding("xor").with_response_encoding("xor");

    let call_options = CallOptions::new();
    client
        .send(&b"0123456789".to_vec(), &RawCodec, &call_options)
        .await
        .unwrap();
    client.finish_sending().await.unwrap();

    let headers: Metadata = [(ENCODING_HEADER, "xor"), (ACCEPT_ENCODING_HEADER, "gzip, xor")]
        .into_iter()
        .collect();
    let outcome = handler.handle_call(call.with_headers(headers)).await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.response_headers.encoding(), Some("xor"));

    let response = client.receive_single(&RawCodec, &call_options).await.unwrap();
    assert_eq!(response, Some(b"0123456".to_vec()));
}

#[tokio::test]
async fn response_stays_uncompressed_unless_accepted() {
    let stats = Arc::new(Stats::default());
    let registry = Arc::new(CompressionRegistry::builder().provider(XorCodec).build());
    let options = ServiceOptions::builder()
        .compression(registry)
        .response_compression("xor")
        .build();
    let handler = trimming_handler(&options, &stats);

    let (call, client_rx) = raw_call(&frame(b"0123456789")).await;
    let outcome = handler.handle_call(call).await;

    assert!(outcome.status.is_ok());
    assert!(outcome.response_headers.is_empty());
    assert_eq!(read_all(client_rx).await, frame(b"0123456"));
}

#[tokio::test]
async fn compressed_request_without_encoding_header_is_internal() {
    let stats = Arc::new(Stats::default());
    let handler = trimming_handler(&ServiceOptions::default(), &stats);

    let mut request = frame(b"abc");
    request[0] = 1;
    let (call, _client_rx) = raw_call(&request).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(
        outcome.status,
        Status::internal("Request did not include grpc-encoding value with compressed message.")
    );
}

/// Tags responses with a trailer naming itself
struct Tag {
    name: String,
}

impl Activate for Tag {
    fn activate(args: &mut ActivationArgs<'_>) -> Result<Self> {
        Ok(Self {
            name: args.next_value::<String>()?,
        })
    }
}

#[async_trait]
impl Interceptor for Tag {
    async fn intercept(&self, context: &ServerCallContext, next: Next<'_>) -> Result<Reply> {
        let seen = context
            .response_trailers()
            .get("x-path")
            .map(str::to_owned)
            .unwrap_or_default();
        context.set_trailer("x-path", format!("{}{}>", seen, self.name));
        next.run(context).await
    }
}

/// Answers without calling the service
struct Cache;

impl Activate for Cache {
    fn activate(_args: &mut ActivationArgs<'_>) -> Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Interceptor for Cache {
    async fn intercept(&self, _context: &ServerCallContext, _next: Next<'_>) -> Result<Reply> {
        Ok(reply(b"cached".to_vec()))
    }
}

/// Short-circuits with a reply of the wrong type
struct Confused;

impl Activate for Confused {
    fn activate(_args: &mut ActivationArgs<'_>) -> Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Interceptor for Confused {
    async fn intercept(&self, _context: &ServerCallContext, _next: Next<'_>) -> Result<Reply> {
        Ok(reply("not bytes"))
    }
}

#[tokio::test]
async fn interceptors_wrap_the_invocation_in_order() {
    let stats = Arc::new(Stats::default());
    let mut interceptors = InterceptorCollection::new();
    interceptors
        .add::<Tag>(vec![Argument::new("outer".to_string())])
        .add::<Tag>(vec![Argument::new("inner".to_string())]);
    let options = ServiceOptions::builder().interceptors(interceptors).build();

    let handler = ServerCallHandler::unary(
        raw_method(MethodType::Unary),
        &options,
        provider(&stats),
        |_worker: Arc<Worker>, request: Vec<u8>, context: ServerCallContext| async move {
            let path = context.response_trailers().get("x-path").map(str::to_owned);
            context.set_trailer("x-path", format!("{}service", path.unwrap_or_default()));
            Ok(request)
        },
    )
    .unwrap();
    assert_eq!(handler.interceptor_count(), 2);

    let (call, client_rx) = raw_call(&frame(b"abc")).await;
    let outcome = handler.handle_call(call).await;

    assert!(outcome.status.is_ok());
    assert_eq!(outcome.trailers.get("x-path"), Some("outer>inner>service"));
    assert_eq!(read_all(client_rx).await, frame(b"abc"));
}

#[tokio::test]
async fn interceptor_can_answer_without_the_service() {
    let stats = Arc::new(Stats::default());
    let mut interceptors = InterceptorCollection::new();
    interceptors.add::<Cache>(vec![]);
    let options = ServiceOptions::builder().interceptors(interceptors).build();
    let handler = trimming_handler(&options, &stats);

    let (call, client_rx) = raw_call(&frame(b"0123456789")).await;
    let outcome = handler.handle_call(call).await;

    assert!(outcome.status.is_ok());
    assert_eq!(read_all(client_rx).await, frame(b"cached"));
    // Activation happens at the innermost stage only
    assert_eq!(stats.created(), 0);
}

#[tokio::test]
async fn mistyped_interceptor_reply_fails_the_call() {
    let stats = Arc::new(Stats::default());
    let mut interceptors = InterceptorCollection::new();
    interceptors.add::<Confused>(vec![]);
    let options = ServiceOptions::builder()
        .interceptors(interceptors)
        .enable_detailed_errors(true)
        .build();
    let handler = trimming_handler(&options, &stats);

    let (call, client_rx) = raw_call(&frame(b"abc")).await;
    let outcome = handler.handle_call(call).await;

    assert_eq!(outcome.status.code(), StatusCode::Unknown);
    assert!(outcome.status.message().contains("Interceptor pipeline returned"));
    assert!(read_all(client_rx).await.is_empty());
}

#[tokio::test]
async fn router_dispatches_by_method_path() {
    let stats = Arc::new(Stats::default());
    let router = Router::new().add(trimming_handler(&ServiceOptions::default(), &stats));
    assert_eq!(router.len(), 1);
    assert!(router.get("/test.Worker/Run").is_some());

    let (call, client_rx) = raw_call(&frame(b"0123456789")).await;
    let outcome = router.route("/test.Worker/Run", call).await;
    assert!(outcome.status.is_ok());
    assert_eq!(read_all(client_rx).await, frame(b"0123456"));

    let (call, _client_rx) = raw_call(&frame(b"abc")).await;
    let outcome = router.route("/test.Worker/Missing", call).await;
    assert_eq!(outcome.status, Status::unimplemented("Method is unimplemented."));
    assert_eq!(stats.created(), 1);
}
