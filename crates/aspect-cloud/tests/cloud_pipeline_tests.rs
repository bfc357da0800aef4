mod test_support;

use std::sync::Arc;

use aspect_cloud::{CloudAspectEngine, CloudRequestData, CloudRequestEngine, CLOUD_ELEMENT_KEY};
use aspect_core::{AspectCompute, FlowValue, PipelineBuilder, PipelineError};
use test_support::{device_engine, request_engine, ScriptedTransport, ENDPOINT, RESOURCE_KEY};

fn single_error(result: Result<(), PipelineError>) -> aspect_core::FlowError {
    match result {
        Err(PipelineError::Aggregate(errors)) => {
            assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
            errors.into_iter().next().unwrap()
        }
        other => panic!("expected an aggregate error, got {other:?}"),
    }
}

#[test]
fn device_properties_are_typed_from_the_response() {
    let transport = ScriptedTransport::standard();
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    let data = pipeline.create_flow_data();
    data.add_evidence("header.user-agent", "Mozilla/5.0");
    data.process().unwrap();

    let device = data.get("device").unwrap();
    let mobile = device.get("ismobile").unwrap();
    assert_eq!(mobile.as_aspect().unwrap().value(), Ok(&FlowValue::Bool(true)));
    let hardware = device.get("hardwarename").unwrap();
    let hardware = hardware.as_aspect().unwrap();
    assert!(!hardware.has_value());
    assert_eq!(hardware.no_value_message(), "No matching profile");
    assert!(device.try_get("hardwarenamenullreason").unwrap().is_none());
    assert_eq!(device.get("extra"), Ok(FlowValue::from("raw")));

    let request = CloudRequestData::from_flow(&data).unwrap();
    assert!(request.process_started().unwrap());
    assert!(request.json_response().unwrap().contains("ismobile"));

    let engine = pipeline.get_engine::<CloudAspectEngine>().unwrap();
    assert_eq!(engine.data_source_tier(), "Lite");
    let names: Vec<String> = engine.compute().properties().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["ismobile".to_string(), "hardwarename".to_string()]);
}

#[test]
fn properties_are_known_before_processing() {
    let transport = ScriptedTransport::standard();
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    let engine = pipeline.get_engine::<CloudAspectEngine>().unwrap();
    let names: Vec<String> = engine.compute().properties().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["ismobile".to_string(), "hardwarename".to_string()]);
    assert_eq!(engine.data_source_tier(), "Lite");
    assert!(transport.posts().is_empty());

    let data = pipeline.create_flow_data();
    data.add_evidence("header.user-agent", "Mozilla/5.0");
    data.process().unwrap();
    assert_eq!(transport.gets_to("accessibleproperties"), 1);
}

#[test]
fn properties_outside_a_pipeline_are_empty() {
    let engine = device_engine();
    assert!(engine.compute().properties().unwrap().is_empty());
    assert_eq!(engine.data_source_tier(), CLOUD_ELEMENT_KEY);
}

#[test]
fn properties_without_request_engine_are_a_configuration_error() {
    let pipeline = PipelineBuilder::new().add_element(device_engine()).build().unwrap();
    let engine = pipeline.get_engine::<CloudAspectEngine>().unwrap();
    assert!(matches!(engine.compute().properties(), Err(PipelineError::Configuration(_))));
}

#[test]
fn form_carries_credentials_and_query_wins_over_header() {
    let transport = ScriptedTransport::standard();
    let engine = CloudRequestEngine::builder().endpoint("https://example.test/api")
                                              .resource_key(RESOURCE_KEY)
                                              .license_key("lic-1")
                                              .cloud_request_origin("https://shop.example")
                                              .transport(transport.clone())
                                              .build()
                                              .unwrap();
    let pipeline = PipelineBuilder::new().add_element(engine).build().unwrap();

    let data = pipeline.create_flow_data();
    data.add_evidence("header.user-agent", "from-header")
        .add_evidence("query.user-agent", "from-query");
    data.process().unwrap();

    let posts = transport.posts();
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post.url, format!("{ENDPOINT}json"));
    assert_eq!(post.field("resource"), Some(RESOURCE_KEY));
    assert_eq!(post.field("license"), Some("lic-1"));
    assert_eq!(post.field("user-agent"), Some("from-query"));
    assert_eq!(post.header("Origin"), Some("https://shop.example"));
    assert_eq!(post.header("Accept"), Some("application/json"));
}

#[test]
fn service_errors_surface_with_status_and_downstream_skips() {
    let transport = ScriptedTransport::standard();
    transport.respond("json", 400, r#"{"errors":["bad key"]}"#);
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    let data = pipeline.create_flow_data();
    data.add_evidence("header.user-agent", "Mozilla/5.0");
    let error = single_error(data.process());

    assert_eq!(error.element_key.as_deref(), Some(CLOUD_ELEMENT_KEY));
    match error.error {
        PipelineError::Remote(remote) => {
            assert!(remote.message.contains("bad key"));
            assert_eq!(remote.status, Some(400));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
    // el aspect engine no llegó a pedir metadata
    assert_eq!(transport.gets_to("accessibleproperties"), 0);
    let request = CloudRequestData::from_flow(&data).unwrap();
    assert_eq!(request.json_response().unwrap(), "");
    assert!(data.get("device").unwrap().is_empty());
}

#[test]
fn several_service_errors_become_one_remote_aggregate() {
    let transport = ScriptedTransport::standard();
    transport.respond("json", 400, r#"{"errors":["bad key", "quota exceeded"]}"#);
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport)).build().unwrap();

    let data = pipeline.create_flow_data();
    match single_error(data.process()).error {
        PipelineError::RemoteAggregate(errors) => {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            assert_eq!(messages, vec!["bad key", "quota exceeded"]);
        }
        other => panic!("expected a remote aggregate, got {other:?}"),
    }
}

#[test]
fn empty_success_response_is_reported_as_no_data() {
    let transport = ScriptedTransport::standard();
    transport.respond("json", 200, "{}");
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport)).build().unwrap();

    let data = pipeline.create_flow_data();
    match single_error(data.process()).error {
        PipelineError::Remote(remote) => {
            assert!(remote.message.contains("no data in response"));
            assert!(remote.message.contains("https://example.test/api/json"));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[test]
fn unreachable_service_is_a_remote_error_without_status() {
    let transport = ScriptedTransport::standard();
    transport.remove("json");
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport)).build().unwrap();

    let data = pipeline.create_flow_data();
    match single_error(data.process()).error {
        PipelineError::Remote(remote) => assert_eq!(remote.status, None),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[test]
fn aspect_engine_without_request_engine_is_a_configuration_error() {
    let pipeline = PipelineBuilder::new().add_element(device_engine()).build().unwrap();
    let data = pipeline.create_flow_data();
    let error = single_error(data.process());
    assert_eq!(error.element_key.as_deref(), Some("device"));
    assert!(matches!(error.error, PipelineError::Configuration(_)));
}

#[test]
fn aspect_engine_before_request_engine_is_a_configuration_error() {
    let transport = ScriptedTransport::standard();
    let pipeline = PipelineBuilder::new().add_element(device_engine())
                                         .add_element(request_engine(&transport))
                                         .build()
                                         .unwrap();
    let data = pipeline.create_flow_data();
    let error = single_error(data.process());
    assert_eq!(error.element_key.as_deref(), Some("device"));
    assert!(matches!(error.error, PipelineError::Configuration(_)));
}

#[test]
fn product_not_granted_fails_every_time_without_refetching() {
    let transport = ScriptedTransport::standard();
    let location = CloudAspectEngine::builder("location").build().unwrap();
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(location)
                                         .build()
                                         .unwrap();

    for _ in 0..2 {
        let data = pipeline.create_flow_data();
        let error = single_error(data.process());
        assert_eq!(error.element_key.as_deref(), Some("location"));
        assert!(matches!(error.error, PipelineError::Configuration(_)));
    }
    assert_eq!(transport.gets_to("accessibleproperties"), 1);
    let expected = format!("{ENDPOINT}accessibleproperties?resource={RESOURCE_KEY}");
    assert!(transport.gets().iter().any(|r| r.url == expected));
}

#[test]
fn properties_failure_is_permanent() {
    let transport = ScriptedTransport::standard();
    transport.respond("accessibleproperties", 500, "");
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    let first = pipeline.create_flow_data();
    assert!(matches!(single_error(first.process()).error, PipelineError::Remote(_)));

    // el servicio se recupera pero el fallo ya quedó fijado
    transport.respond("accessibleproperties", 200, test_support::PRODUCTS);
    let second = pipeline.create_flow_data();
    let error = single_error(second.process());
    assert_eq!(error.element_key.as_deref(), Some("device"));
    assert_eq!(transport.gets_to("accessibleproperties"), 1);
    assert!(pipeline.get_engine::<CloudAspectEngine>().unwrap().compute().properties().is_err());
}

#[test]
fn missing_section_leaves_the_output_empty() {
    let transport = ScriptedTransport::standard();
    transport.respond("json", 200, r#"{"location":{"town":"Lima"}}"#);
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    let data = pipeline.create_flow_data();
    data.process().unwrap();
    assert!(data.get("device").unwrap().is_empty());
}

#[test]
fn evidence_keys_failure_is_retried() {
    let transport = ScriptedTransport::standard();
    transport.remove("evidencekeys");
    let engine = request_engine(&transport);

    assert!(matches!(engine.compute().evidence_keys(), Err(PipelineError::Remote(_))));
    transport.respond("evidencekeys", 200, test_support::EVIDENCE_KEYS);
    let keys = engine.compute().evidence_keys().unwrap();
    assert_eq!(keys.len(), 3);
    engine.compute().evidence_keys().unwrap();
    assert_eq!(transport.gets_to("evidencekeys"), 2);
}

#[test]
fn pipeline_filter_uses_the_service_evidence_keys() {
    let transport = ScriptedTransport::standard();
    let pipeline = PipelineBuilder::new().add_element(request_engine(&transport))
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();
    let filter = pipeline.evidence_key_filter().unwrap();
    assert!(filter.include("header.User-Agent"));
    assert!(filter.include("query.sec-ch-ua"));
    assert!(!filter.include("cookie.session"));
}

#[test]
fn evidence_filter_is_built_once() {
    let transport = ScriptedTransport::standard();
    let engine = request_engine(&transport);

    let first = engine.compute().evidence_key_filter().unwrap();
    let second = engine.compute().evidence_key_filter().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.gets_to("evidencekeys"), 1);
}

#[test]
fn evidence_filter_failure_is_retried() {
    let transport = ScriptedTransport::standard();
    transport.remove("evidencekeys");
    let engine = request_engine(&transport);

    assert!(engine.compute().evidence_key_filter().is_err());
    transport.respond("evidencekeys", 200, test_support::EVIDENCE_KEYS);
    let filter = engine.compute().evidence_key_filter().unwrap();
    assert!(filter.include("header.user-agent"));
}

#[test]
fn cached_request_skips_the_service() {
    let transport = ScriptedTransport::standard();
    let engine = CloudRequestEngine::builder().endpoint(ENDPOINT)
                                              .resource_key(RESOURCE_KEY)
                                              .transport(transport.clone())
                                              .cache_size(8)
                                              .build()
                                              .unwrap();
    let pipeline = PipelineBuilder::new().add_element(engine)
                                         .add_element(device_engine())
                                         .build()
                                         .unwrap();

    for _ in 0..2 {
        let data = pipeline.create_flow_data();
        data.add_evidence("header.user-agent", "Mozilla/5.0")
            .add_evidence("cookie.session", "ignored");
        data.process().unwrap();
        assert!(data.get("device").unwrap().get("ismobile").is_ok());
    }
    assert_eq!(transport.posts().len(), 1);
}
