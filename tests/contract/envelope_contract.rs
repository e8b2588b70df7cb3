use quotefetch_core::envelope::{decode, parse};
use quotefetch_core::{
    ContractFactory, ContractRequest, DataKind, EnvelopeError, ErrorKind, FetchParams, HttpResponse,
    Identity, Operation, OptionLeg, QuoteDate, QuoteServerFactory, Right, Root, SecurityType,
    Strike, ValidationError,
};
use serde_json::{json, Value};

struct OperationCase {
    name: &'static str,
    security: SecurityType,
    identity: Identity,
    params: FetchParams,
    path: &'static str,
    query: &'static [&'static str],
}

fn date(raw: &str) -> QuoteDate {
    QuoteDate::parse(raw).expect("valid date")
}

fn root() -> Root {
    Root::parse("AAPL").expect("valid root")
}

fn series() -> Identity {
    Identity::series(
        root(),
        date("20230317"),
        OptionLeg::new(Strike::from_scaled(150_000).expect("strike"), Right::Call),
    )
}

fn range() -> FetchParams {
    FetchParams::range(date("20230301"), date("20230310"))
}

fn operation_cases() -> Vec<OperationCase> {
    vec![
        OperationCase {
            name: "list_roots",
            security: SecurityType::Option,
            identity: Identity::root(root()),
            params: FetchParams::default(),
            path: "list/roots",
            query: &["sec"],
        },
        OperationCase {
            name: "list_expirations",
            security: SecurityType::Option,
            identity: Identity::root(root()),
            params: FetchParams::default(),
            path: "list/expirations",
            query: &["root"],
        },
        OperationCase {
            name: "list_strikes",
            security: SecurityType::Option,
            identity: Identity::expiration(root(), date("20230317")),
            params: FetchParams::default(),
            path: "list/strikes",
            query: &["root", "exp"],
        },
        OperationCase {
            name: "list_dates_implied_volatility",
            security: SecurityType::Option,
            identity: series(),
            params: FetchParams::default(),
            path: "list/dates/option/implied_volatility",
            query: &["root", "exp", "right", "strike"],
        },
        OperationCase {
            name: "hist_quote",
            security: SecurityType::Option,
            identity: series(),
            params: range().with_ivl_ms(60_000),
            path: "hist/option/quote",
            query: &["start_date", "end_date", "root", "ivl", "exp", "right", "strike"],
        },
        OperationCase {
            name: "hist_eod",
            security: SecurityType::Option,
            identity: series(),
            params: range(),
            path: "hist/option/eod",
            query: &["start_date", "end_date", "root", "ivl", "exp", "right", "strike"],
        },
        OperationCase {
            name: "at_time_trade",
            security: SecurityType::Option,
            identity: series(),
            params: range().with_ivl_ms(0).with_extra("ms_of_day", "34200000"),
            path: "at_time/option/trade",
            query: &[
                "start_date",
                "end_date",
                "root",
                "ivl",
                "exp",
                "right",
                "strike",
                "ms_of_day",
            ],
        },
        OperationCase {
            name: "bulk_hist_eod",
            security: SecurityType::Option,
            identity: Identity::expiration(root(), date("20230317")),
            params: range(),
            path: "bulk_hist/option/eod",
            query: &["start_date", "end_date", "root", "ivl", "exp"],
        },
        OperationCase {
            name: "hist_ohlc",
            security: SecurityType::Stock,
            identity: Identity::root(root()),
            params: range(),
            path: "hist/stock/ohlc",
            query: &["start_date", "end_date", "root", "ivl"],
        },
    ]
}

fn build(case: &OperationCase) -> ContractRequest {
    let operation = Operation::parse(case.name).expect("known operation");
    QuoteServerFactory::default()
        .build(case.security, case.identity.clone(), operation, &case.params)
        .unwrap_or_else(|error| panic!("operation '{}' failed to build: {error}", case.name))
}

fn respond(body: Value) -> HttpResponse {
    HttpResponse::ok_json(body.to_string())
}

#[test]
fn every_operation_builds_its_path_and_parameter_order() {
    for case in operation_cases() {
        let request = build(&case);

        assert_eq!(
            request.url(),
            format!("http://127.0.0.1:25510/{}", case.path),
            "operation '{}': url",
            case.name
        );
        let keys: Vec<&str> = request.params().iter().map(|(key, _)| key).collect();
        assert_eq!(keys, case.query, "operation '{}': query keys", case.name);
        assert_eq!(
            request.operation().name(),
            case.name,
            "operation '{}': canonical name",
            case.name
        );
    }
}

#[test]
fn series_parameters_use_wire_encodings() {
    let request = build(&operation_cases()[4]);

    assert_eq!(request.params().get("start_date"), Some("20230301"));
    assert_eq!(request.params().get("exp"), Some("20230317"));
    assert_eq!(request.params().get("right"), Some("C"));
    assert_eq!(request.params().get("strike"), Some("150000"));
    assert_eq!(request.params().get("ivl"), Some("60000"));
}

#[test]
fn daily_datasets_default_their_interval_but_intraday_ones_require_it() {
    let eod = build(&operation_cases()[5]);
    assert_eq!(eod.params().get("ivl"), Some("3600000"));

    let error = QuoteServerFactory::default()
        .build(
            SecurityType::Option,
            series(),
            Operation::Hist(DataKind::Quote),
            &range(),
        )
        .expect_err("intraday without ivl");
    assert!(matches!(error, ValidationError::MissingParam { param: "ivl", .. }));
}

#[test]
fn identity_shape_is_enforced_per_operation() {
    let factory = QuoteServerFactory::default();

    let series_on_bulk = factory.build(
        SecurityType::Option,
        series(),
        Operation::BulkHist(DataKind::Eod),
        &range(),
    );
    assert!(matches!(
        series_on_bulk,
        Err(ValidationError::UnexpectedField { .. })
    ));

    let hist_without_leg = factory.build(
        SecurityType::Option,
        Identity::expiration(root(), date("20230317")),
        Operation::Hist(DataKind::Eod),
        &range(),
    );
    assert!(matches!(
        hist_without_leg,
        Err(ValidationError::LegRequired { .. })
    ));

    let past_expiry = factory.build(
        SecurityType::Option,
        series(),
        Operation::Hist(DataKind::Eod),
        &FetchParams::range(date("20230301"), date("20230320")),
    );
    assert!(matches!(
        past_expiry,
        Err(ValidationError::RangeAfterExpiry { .. })
    ));
}

#[test]
fn list_operations_decode_into_their_record_key() {
    let cases = [
        ("list_roots", json!(["AAPL", "MSFT"]), "roots"),
        ("list_expirations", json!([20230317, 20230421]), "expirations"),
        ("list_strikes", json!([145000, 150000]), "strikes"),
        (
            "list_dates_implied_volatility",
            json!([20230301, 20230302]),
            "implied_volatility",
        ),
    ];

    for (name, rows, key) in cases {
        let body = json!({
            "header": {"id": 1, "latency_ms": 2, "error_type": "null", "error_msg": "null", "format": null},
            "response": rows,
        });
        let envelope = parse(&respond(body)).expect("envelope");
        let operation = Operation::parse(name).expect("operation");
        let records = decode(&envelope, operation).expect("records");

        assert_eq!(records.len(), 2, "operation '{name}': rows");
        assert_eq!(
            records[0].keys().collect::<Vec<_>>(),
            [key],
            "operation '{name}': record key"
        );
    }
}

#[test]
fn formatted_rows_keep_server_column_order() {
    let body = json!({
        "header": {
            "id": "abc-1",
            "latency_ms": 9,
            "error_type": "null",
            "format": ["ms_of_day", "bid", "ask", "date"],
        },
        "response": [[34200000, 1.05, 1.10, 20230301]],
    });
    let envelope = parse(&respond(body)).expect("envelope");
    let records = decode(&envelope, Operation::Hist(DataKind::Quote)).expect("records");

    assert_eq!(
        records[0].keys().collect::<Vec<_>>(),
        ["ms_of_day", "bid", "ask", "date"]
    );
    assert_eq!(envelope.request_id.as_deref(), Some("abc-1"));
    assert_eq!(envelope.latency_ms, Some(9));
}

#[test]
fn header_errors_classify_by_message() {
    let cases = [
        (
            "Nonexistent root symbol or expiration. Please check the root symbol.",
            ErrorKind::RootOrExpirationInvalid,
        ),
        ("No data for the specified timeframe", ErrorKind::NoDataForContract),
        ("Invalid session", ErrorKind::OtherFormatError),
    ];

    for (message, expected) in cases {
        let body = json!({
            "header": {"error_type": "SERVER_ERROR", "error_msg": message},
            "response": [],
        });
        let envelope = parse(&respond(body)).expect("envelope");
        assert_eq!(envelope.error_kind, expected, "message '{message}'");
        assert_eq!(
            decode(&envelope, Operation::Hist(DataKind::Eod))
                .expect_err("header error")
                .kind(),
            expected
        );
    }
}

#[test]
fn transport_failures_never_reach_the_decoder() {
    let error = parse(&HttpResponse::with_status(500, "boom")).expect_err("non-200");
    assert_eq!(error, EnvelopeError::Transport { status: 500 });

    let error = parse(&HttpResponse::ok_json("not json")).expect_err("garbage");
    assert!(matches!(error, EnvelopeError::Malformed { .. }));
}
