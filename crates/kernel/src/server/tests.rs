use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;
use crate::descriptor::fields::DISPLAY_NAME;
use crate::info::Impact;
use crate::interface::{AttributeDef, ManagementInterface, OperationDef};
use crate::invoker::InvokerState;
use crate::notification::{BroadcasterSupport, Notification, NotificationBroadcaster, TypeFilter};
use crate::query;
use crate::test_support::{ALARM, Hooked, Thermostat, name, server};
use crate::value::types;
use crate::{LifecyclePhase, ServerConfig, TargetError};

fn thermostat_at(server: &MBeanServer, n: &str) -> Arc<Thermostat> {
	let thermostat = Thermostat::new();
	server
		.register_mbean(Arc::clone(&thermostat) as Arc<dyn ManagedResource>, Some(name(n)))
		.unwrap();
	thermostat
}

#[derive(Default)]
struct Inbox(Mutex<Vec<Notification>>);

impl NotificationListener for Inbox {
	fn handle_notification(&self, notification: &Notification, _: Option<&Value>) {
		self.0.lock().push(notification.clone());
	}
}

impl Inbox {
	fn kinds(&self) -> Vec<String> {
		self.0.lock().iter().map(|n| n.kind.clone()).collect()
	}
}

fn inbox() -> (Arc<Inbox>, Arc<dyn NotificationListener>) {
	let inbox = Arc::new(Inbox::default());
	let listener: Arc<dyn NotificationListener> = Arc::clone(&inbox) as _;
	(inbox, listener)
}

// ── A. registration ──

#[test]
fn fresh_server_holds_only_its_delegate() {
	let server = server();
	assert_eq!(server.get_mbean_count(), 1);
	assert_eq!(server.get_domains(), vec![RESERVED_DOMAIN]);
	assert_eq!(server.get_default_domain(), "DefaultDomain");
	assert!(server.is_registered(&name(DELEGATE_NAME)));
	assert_eq!(server.get_object_instance(&name(DELEGATE_NAME)).unwrap().class_name, DELEGATE_CLASS);
}

#[test]
fn register_then_lookup_and_duplicate_is_rejected() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");

	let instance = server.get_object_instance(&name("app:type=Thermostat")).unwrap();
	assert_eq!(instance.class_name, "Thermostat");
	*thermostat.target.lock() = 19;
	assert_eq!(server.get_attribute(&name("app:type=Thermostat"), "Target").unwrap(), Value::Int(19));

	let again = server.register_mbean(Thermostat::new(), Some(name("app:type=Thermostat")));
	assert!(matches!(again, Err(ManagementError::DuplicateName(_))));
	assert_eq!(server.get_mbean_count(), 2);
}

#[test]
fn unregister_then_lookup_is_not_found() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");

	server.unregister_mbean(&name("app:type=Thermostat")).unwrap();
	assert!(!server.is_registered(&name("app:type=Thermostat")));
	assert!(matches!(
		server.get_attribute(&name("app:type=Thermostat"), "Target"),
		Err(ManagementError::NotFound(_))
	));

	let count = server.get_mbean_count();
	assert!(matches!(
		server.unregister_mbean(&name("app:type=Ghost")),
		Err(ManagementError::NotFound(_))
	));
	assert_eq!(server.get_mbean_count(), count);
}

#[rstest]
#[case::domain_pattern("ap?:type=A", "pattern")]
#[case::property_pattern("app:type=A,*", "pattern")]
#[case::reserved("JMImplementation:type=Fake", "reserved")]
fn rejects_unusable_names(#[case] n: &str, #[case] expected: &str) {
	let server = server();
	let err = server.register_mbean(Thermostat::new(), Some(name(n))).unwrap_err();
	let kind = match err {
		ManagementError::PatternNotAllowed(_) => "pattern",
		ManagementError::Reserved(_) => "reserved",
		_ => "other",
	};
	assert_eq!(kind, expected);
	assert_eq!(server.get_mbean_count(), 1);
}

#[test]
fn delegate_cannot_be_unregistered() {
	let server = server();
	assert!(matches!(
		server.unregister_mbean(&name(DELEGATE_NAME)),
		Err(ManagementError::Reserved(_))
	));
	assert!(server.is_registered(&name(DELEGATE_NAME)));
}

#[test]
fn empty_domain_means_default_domain() {
	let server = server();
	let instance = server.register_mbean(Thermostat::new(), Some(name(":type=Local"))).unwrap();
	assert_eq!(instance.name, name("DefaultDomain:type=Local"));
	assert!(server.is_registered(&name(":type=Local")));
	assert_eq!(server.query_names(Some(&name(":*")), None).unwrap(), vec![name("DefaultDomain:type=Local")]);
}

#[test]
fn unmanageable_resources_are_rejected() {
	struct Blank;
	impl ManagedResource for Blank {
		fn interface(self: Arc<Self>) -> ManagementInterface {
			ManagementInterface::new("Blank")
		}
	}

	let server = server();
	assert!(matches!(
		server.register_mbean(Arc::new(Blank), Some(name("app:type=Blank"))),
		Err(ManagementError::NotManageable { .. })
	));
}

// ── B. lifecycle ──

#[test]
fn hooks_run_in_order_around_registration() {
	let server = server();
	let hooked = Arc::new(Hooked::default());
	server
		.register_mbean(Arc::clone(&hooked) as Arc<dyn ManagedResource>, Some(name("app:type=Hooked")))
		.unwrap();
	server.unregister_mbean(&name("app:type=Hooked")).unwrap();

	assert_eq!(
		hooked.events(),
		vec!["pre_register(app:type=Hooked)", "post_register(true)", "pre_deregister", "post_deregister"]
	);
}

#[test]
fn pre_register_may_choose_the_name() {
	let server = server();
	let hooked = Arc::new(Hooked {
		choose: Some(name("app:type=Chosen")),
		..Hooked::default()
	});
	let instance = server.register_mbean(hooked, None).unwrap();
	assert_eq!(instance.name, name("app:type=Chosen"));
}

#[test]
fn missing_name_is_reported_after_pre_register() {
	let server = server();
	let hooked = Arc::new(Hooked::default());
	let err = server
		.register_mbean(Arc::clone(&hooked) as Arc<dyn ManagedResource>, None)
		.unwrap_err();
	assert!(matches!(err, ManagementError::MissingName));
	assert_eq!(hooked.events(), vec!["pre_register(-)", "post_register(false)"]);
}

#[test]
fn post_register_veto_rolls_back() {
	let server = server();
	let hooked = Arc::new(Hooked {
		veto_post_register: true,
		..Hooked::default()
	});
	let err = server
		.register_mbean(Arc::clone(&hooked) as Arc<dyn ManagedResource>, Some(name("app:type=Hooked")))
		.unwrap_err();

	assert!(matches!(
		err,
		ManagementError::Lifecycle {
			phase: LifecyclePhase::PostRegister,
			..
		}
	));
	assert!(!server.is_registered(&name("app:type=Hooked")));
	assert_eq!(server.get_mbean_count(), 1);
	// The reservation was released.
	thermostat_at(&server, "app:type=Hooked");
}

#[test]
fn pre_deregister_veto_keeps_the_entry() {
	let server = server();
	let hooked = Arc::new(Hooked {
		veto_pre_deregister: true,
		..Hooked::default()
	});
	server
		.register_mbean(Arc::clone(&hooked) as Arc<dyn ManagedResource>, Some(name("app:type=Hooked")))
		.unwrap();

	let err = server.unregister_mbean(&name("app:type=Hooked")).unwrap_err();
	assert!(matches!(
		err,
		ManagementError::Lifecycle {
			phase: LifecyclePhase::PreDeregister,
			..
		}
	));
	let entry = server.registry.get(&name("app:type=Hooked")).unwrap();
	assert_eq!(entry.invoker().state(), InvokerState::Registered);
	assert_eq!(server.get_attribute(&name("app:type=Hooked"), "Alive").unwrap(), Value::Bool(true));
}

#[test]
fn post_deregister_failure_is_only_logged() {
	let server = server();
	let hooked = Arc::new(Hooked {
		fail_post_deregister: true,
		..Hooked::default()
	});
	server
		.register_mbean(Arc::clone(&hooked) as Arc<dyn ManagedResource>, Some(name("app:type=Hooked")))
		.unwrap();

	server.unregister_mbean(&name("app:type=Hooked")).unwrap();
	assert!(!server.is_registered(&name("app:type=Hooked")));
}

#[test]
fn unregister_succeeds_after_the_loader_is_dropped() {
	let server = server();
	let loader = ContextLoader::new("deploy");
	let hooked = Arc::new(Hooked::default());
	let n = name("app:type=Orphan");
	server
		.register_mbean_in(Arc::clone(&hooked) as Arc<dyn ManagedResource>, Some(n.clone()), &loader)
		.unwrap();
	drop(loader);

	assert!(matches!(
		server.get_attribute(&n, "Alive"),
		Err(ManagementError::DispatchFailure { .. })
	));
	server.unregister_mbean(&n).unwrap();
	assert!(!server.is_registered(&n));
	assert_eq!(hooked.events()[2..], ["pre_deregister", "post_deregister"]);
}

#[test]
fn concurrent_registrations_of_one_name_admit_exactly_one() {
	let server = server();
	let admitted = AtomicUsize::new(0);
	std::thread::scope(|s| {
		for _ in 0..8 {
			s.spawn(|| {
				if server
					.register_mbean(Thermostat::new(), Some(name("app:type=Contended")))
					.is_ok()
				{
					admitted.fetch_add(1, Ordering::SeqCst);
				}
			});
		}
	});
	assert_eq!(admitted.load(Ordering::SeqCst), 1);
	assert_eq!(server.get_mbean_count(), 2);
}

// ── C. attributes and operations ──

#[test]
fn set_then_get_round_trips() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");

	server.set_attribute(&n, Attribute::new("Target", 23)).unwrap();
	assert_eq!(server.get_attribute(&n, "Target").unwrap(), Value::Int(23));
}

#[test]
fn batch_reads_skip_failures() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");

	let values = server
		.get_attributes(&name("app:type=Thermostat"), &["Target", "Missing", "Secret", "Reads"])
		.unwrap();
	assert_eq!(values, vec![Attribute::new("Target", 0), Attribute::new("Reads", Value::Long(1))]);
	assert!(matches!(
		server.get_attributes(&name("app:type=Ghost"), &["Target"]),
		Err(ManagementError::NotFound(_))
	));
}

#[test]
fn batch_writes_return_what_was_written() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");

	let written = server
		.set_attributes(
			&name("app:type=Thermostat"),
			vec![
				Attribute::new("Target", 5),
				Attribute::new("Reads", Value::Long(3)),
				Attribute::new("Secret", "hunter2"),
				Attribute::new("Target", "warm"),
			],
		)
		.unwrap();
	assert_eq!(written, vec![Attribute::new("Target", 5), Attribute::new("Secret", "hunter2")]);
	assert_eq!(*thermostat.target.lock(), 5);
	assert_eq!(*thermostat.secret.lock(), "hunter2");
}

#[test]
fn invoke_resolves_overloads() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");

	assert_eq!(server.invoke(&n, "adjust", vec![Value::Int(2)], &[types::INT]).unwrap(), Value::Int(2));
	assert_eq!(
		server
			.invoke(&n, "adjust", vec![Value::Int(2), Value::Int(3)], &[types::INT, types::INT])
			.unwrap(),
		Value::Int(5)
	);
	assert!(matches!(
		server.invoke(&n, "adjust", vec![Value::Int(1); 3], &[types::INT; 3]),
		Err(ManagementError::OperationNotFound { .. })
	));
	assert!(matches!(
		server.invoke(&n, "adjust", vec![Value::from("x")], &[types::STRING]),
		Err(ManagementError::NoSuchMethod { .. })
	));
}

#[test]
fn qualified_operation_names_follow_config() {
	let server = MBeanServer::new(ServerConfig {
		strip_operation_qualifier: true,
		..ServerConfig::default()
	})
	.unwrap();
	thermostat_at(&server, "app:type=Thermostat");

	let result = server.invoke(&name("app:type=Thermostat"), "control.adjust", vec![Value::Int(4)], &[types::INT]);
	assert_eq!(result.unwrap(), Value::Int(4));
}

// ── D. interceptors and descriptors ──

struct Recorder {
	label: &'static str,
	log: Arc<Mutex<Vec<&'static str>>>,
}

impl Interceptor for Recorder {
	fn name(&self) -> &str {
		self.label
	}

	fn invoke(&self, invocation: &mut crate::Invocation<'_>) -> Result<Value> {
		self.log.lock().push(self.label);
		invocation.invoke()
	}
}

#[test]
fn interceptors_added_later_run_first() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	let log = Arc::new(Mutex::new(Vec::new()));
	let x: Arc<dyn Interceptor> = Arc::new(Recorder {
		label: "x",
		log: Arc::clone(&log),
	});
	let y: Arc<dyn Interceptor> = Arc::new(Recorder {
		label: "y",
		log: Arc::clone(&log),
	});

	server.add_operation_interceptor(&n, Arc::clone(&x)).unwrap();
	server.add_operation_interceptor(&n, Arc::clone(&y)).unwrap();
	server.invoke(&n, "adjust", vec![Value::Int(1)], &[types::INT]).unwrap();
	assert_eq!(*log.lock(), vec!["y", "x"]);

	assert!(server.remove_operation_interceptor(&n, &y).unwrap());
	assert!(!server.remove_operation_interceptor(&n, &y).unwrap());
	assert!(!server.remove_attribute_interceptor(&n, &x).unwrap());
	let info = server.get_mbean_info(&n).unwrap();
	assert_eq!(info.operations_named("adjust").next().unwrap().interceptors, vec!["x"]);
}

#[test]
fn trace_config_wraps_every_member() {
	let server = MBeanServer::new(ServerConfig {
		trace_invocations: true,
		..ServerConfig::default()
	})
	.unwrap();
	thermostat_at(&server, "app:type=Thermostat");

	let info = server.get_mbean_info(&name("app:type=Thermostat")).unwrap();
	assert!(info.attributes.iter().all(|a| a.interceptors == ["tracing"]));
	assert!(info.operations.iter().all(|o| o.interceptors == ["tracing"]));
}

#[test]
fn cache_interceptor_through_the_server() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	server
		.set_descriptor_field(&n, Member::Attribute("Target"), crate::descriptor::fields::CURRENCY_TIME_LIMIT, Value::Int(0))
		.unwrap();
	server
		.add_attribute_interceptor(&n, Arc::new(crate::AttributeCacheInterceptor::new()))
		.unwrap();

	for _ in 0..3 {
		server.get_attribute(&n, "Target").unwrap();
	}
	assert_eq!(thermostat.reads.load(Ordering::SeqCst), 1);
}

#[test]
fn descriptor_edits_are_visible_in_info() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	server
		.set_descriptor_field(&n, Member::Attribute("Target"), DISPLAY_NAME, Value::from("Set point"))
		.unwrap();

	let info = server.get_mbean_info(&n).unwrap();
	assert_eq!(info.attribute("Target").unwrap().descriptor.get(DISPLAY_NAME), Some(&Value::from("Set point")));
	assert_eq!(
		info.operations_named("adjust").next().map(|o| o.impact),
		Some(Impact::Action)
	);
}

// ── E. notifications ──

#[test]
fn filtered_listener_receives_rewritten_notifications() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	let (alarms, alarm_listener) = inbox();
	let (infos, info_listener) = inbox();

	server
		.add_notification_listener(&n, Arc::clone(&alarm_listener), Some(Arc::new(TypeFilter::new().enable(ALARM))), None)
		.unwrap();
	server
		.add_notification_listener(&n, info_listener, Some(Arc::new(TypeFilter::new().enable("info"))), None)
		.unwrap();

	assert_eq!(thermostat.alarm("too hot"), 1);
	let received = alarms.0.lock().clone();
	assert_eq!(received.len(), 1);
	assert_eq!(received[0].source, crate::NotificationSource::Name(n.clone()));
	assert!(infos.0.lock().is_empty());

	server.remove_notification_listener(&n, &alarm_listener).unwrap();
	assert_eq!(thermostat.alarm("still hot"), 0);
	assert_eq!(alarms.0.lock().len(), 1);
}

#[test]
fn listener_removal_forms() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	let (_, listener) = inbox();
	let filter: Arc<dyn NotificationFilter> = Arc::new(TypeFilter::new().enable(ALARM));

	server
		.add_notification_listener(&n, Arc::clone(&listener), Some(Arc::clone(&filter)), Some(Value::Int(1)))
		.unwrap();
	server
		.add_notification_listener(&n, Arc::clone(&listener), None, Some(Value::Int(2)))
		.unwrap();
	assert_eq!(thermostat.support.listener_count(), 2);

	assert!(matches!(
		server.remove_notification_listener_with(&n, &listener, None, Some(&Value::Int(1))),
		Err(ManagementError::ListenerNotFound(_))
	));
	server
		.remove_notification_listener_with(&n, &listener, Some(&filter), Some(&Value::Int(1)))
		.unwrap();
	assert_eq!(thermostat.support.listener_count(), 1);

	server.remove_notification_listener(&n, &listener).unwrap();
	assert_eq!(thermostat.support.listener_count(), 0);
	assert!(matches!(
		server.remove_notification_listener(&n, &listener),
		Err(ManagementError::ListenerNotFound(_))
	));
}

#[test]
fn listeners_need_a_registered_broadcaster() {
	let server = server();
	server
		.register_mbean(Arc::new(Hooked::default()), Some(name("app:type=Hooked")))
		.unwrap();
	let (_, listener) = inbox();

	assert!(matches!(
		server.add_notification_listener(&name("app:type=Hooked"), Arc::clone(&listener), None, None),
		Err(ManagementError::NotABroadcaster(_))
	));
	assert!(matches!(
		server.add_notification_listener(&name("app:type=Ghost"), listener, None, None),
		Err(ManagementError::NotFound(_))
	));
}

#[test]
fn unregistration_detaches_listeners() {
	let server = server();
	let thermostat = thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	let (received, listener) = inbox();
	server.add_notification_listener(&n, listener, None, None).unwrap();

	server.unregister_mbean(&n).unwrap();
	assert_eq!(thermostat.support.listener_count(), 0);
	thermostat.alarm("orphaned");
	assert!(received.0.lock().is_empty());
}

/// Broadcaster that unregisters itself while a listener is being added.
struct Vanishing {
	support: BroadcasterSupport,
	server: std::sync::OnceLock<std::sync::Weak<MBeanServer>>,
}

impl ManagedResource for Vanishing {
	fn interface(self: Arc<Self>) -> ManagementInterface {
		ManagementInterface::new("Vanishing").attribute(AttributeDef::new("Alive", types::BOOLEAN).getter(|| Ok(Value::Bool(true))))
	}

	fn broadcaster(&self) -> Option<&dyn NotificationBroadcaster> {
		Some(self)
	}
}

impl NotificationBroadcaster for Vanishing {
	fn add_notification_listener(
		&self,
		listener: Arc<dyn NotificationListener>,
		filter: Option<Arc<dyn NotificationFilter>>,
		handback: Option<Value>,
	) {
		self.support.add_notification_listener(listener, filter, handback);
		if let Some(server) = self.server.get().and_then(std::sync::Weak::upgrade) {
			server.unregister_mbean(&name("app:type=Vanishing")).unwrap();
		}
	}

	fn remove_notification_listener(&self, listener: &Arc<dyn NotificationListener>) -> bool {
		self.support.remove_notification_listener(listener)
	}

	fn remove_notification_listener_with(
		&self,
		listener: &Arc<dyn NotificationListener>,
		filter: Option<&Arc<dyn NotificationFilter>>,
		handback: Option<&Value>,
	) -> bool {
		self.support.remove_notification_listener_with(listener, filter, handback)
	}
}

#[test]
fn listener_added_during_unregistration_is_rolled_back() {
	let server = Arc::new(server());
	let vanishing = Arc::new(Vanishing {
		support: BroadcasterSupport::default(),
		server: std::sync::OnceLock::new(),
	});
	let n = name("app:type=Vanishing");
	server
		.register_mbean(Arc::clone(&vanishing) as Arc<dyn ManagedResource>, Some(n.clone()))
		.unwrap();
	vanishing.server.set(Arc::downgrade(&server)).unwrap();
	let (_, listener) = inbox();

	assert!(matches!(
		server.add_notification_listener(&n, listener, None, None),
		Err(ManagementError::NotFound(_))
	));
	assert!(!server.is_registered(&n));
	assert_eq!(vanishing.support.listener_count(), 0);
	assert!(server.listeners.remove_source(&n).is_empty());
}

#[test]
fn delegate_announces_registration_changes() {
	let server = server();
	let (received, listener) = inbox();
	server
		.add_notification_listener(&name(DELEGATE_NAME), listener, None, None)
		.unwrap();

	thermostat_at(&server, "app:type=Thermostat");
	server.unregister_mbean(&name("app:type=Thermostat")).unwrap();

	assert_eq!(received.kinds(), vec![REGISTERED, UNREGISTERED]);
	let notifications = received.0.lock().clone();
	assert!(
		notifications
			.iter()
			.all(|n| n.user_data == Some(Value::Name(name("app:type=Thermostat"))))
	);
	assert!(notifications[0].sequence < notifications[1].sequence);
}

#[test]
fn delegate_reports_server_identity() {
	let server = MBeanServer::new(ServerConfig {
		server_id: Some("node-7".to_owned()),
		..ServerConfig::default()
	})
	.unwrap();
	let d = name(DELEGATE_NAME);
	assert_eq!(server.get_attribute(&d, "MBeanServerId").unwrap(), Value::from("node-7"));
	assert_eq!(server.get_attribute(&d, "ImplementationName").unwrap(), Value::from("mantle"));
	let info = server.get_mbean_info(&d).unwrap();
	assert_eq!(info.notifications[0].types, vec![REGISTERED, UNREGISTERED]);
	assert_eq!(server.delegate().broadcaster().map(|b| b.notification_info().len()), Some(1));
}

// ── F. queries ──

fn populated() -> MBeanServer {
	let server = server();
	for (n, target) in [("app:type=Thermostat,room=a", 20), ("app:type=Thermostat,room=b", 25)] {
		let thermostat = thermostat_at(&server, n);
		*thermostat.target.lock() = target;
	}
	server
		.register_mbean(Arc::new(Hooked::default()), Some(name("app:type=Hooked")))
		.unwrap();
	server
}

#[test]
fn query_by_pattern() {
	let server = populated();
	assert_eq!(server.query_names(None, None).unwrap().len(), 4);
	assert_eq!(
		server.query_names(Some(&name("app:type=Thermostat,*")), None).unwrap(),
		vec![name("app:room=a,type=Thermostat"), name("app:room=b,type=Thermostat")]
	);
	assert!(server.query_names(Some(&name("nowhere:*")), None).unwrap().is_empty());
}

#[test]
fn query_expressions_filter_results() {
	let server = populated();
	let pattern = name("app:*");

	let warm = query::attr_eq("Target", 25);
	assert_eq!(
		server.query_names(Some(&pattern), Some(&warm)).unwrap(),
		vec![name("app:room=b,type=Thermostat")]
	);

	let devices = query::instance_of("Device");
	assert_eq!(server.query_mbeans(Some(&pattern), Some(&devices)).unwrap().len(), 2);

	let either = query::or(query::class_name_eq("Hooked"), query::attr_eq("Target", 20));
	assert_eq!(server.query_names(Some(&pattern), Some(&either)).unwrap().len(), 2);

	let neither = query::not(query::class_name_eq("Thermostat"));
	assert_eq!(server.query_names(Some(&pattern), Some(&neither)).unwrap(), vec![name("app:type=Hooked")]);

	let room_a = query::predicate(|_, n: &ObjectName| Ok(n.key_property("room") == Some("a")));
	let both = query::and(query::class_name_eq("Thermostat"), room_a);
	assert_eq!(server.query_names(Some(&pattern), Some(&both)).unwrap(), vec![name("app:room=a,type=Thermostat")]);
}

#[test]
fn failing_queries_do_not_match() {
	let server = populated();
	// Hooked has no Target attribute; the lookup error counts as a miss.
	let cold = query::not(query::attr_eq("Target", 99));
	let names = server.query_names(Some(&name("app:*")), Some(&cold)).unwrap();
	assert_eq!(names.len(), 2);
	assert!(!names.contains(&name("app:type=Hooked")));
}

// ── G. permissions, factories, context ──

fn deny_invoke_and_hide_hooked(request: &PermissionRequest<'_>) -> bool {
	match request.action {
		Action::Invoke => false,
		Action::QueryNames | Action::QueryMBeans => request.class_name != Some("Hooked"),
		_ => true,
	}
}

#[test]
fn permission_checker_guards_calls_and_filters_queries() {
	let server = server().with_permission_checker(deny_invoke_and_hide_hooked);
	thermostat_at(&server, "app:type=Thermostat");
	server
		.register_mbean(Arc::new(Hooked::default()), Some(name("app:type=Hooked")))
		.unwrap();
	let n = name("app:type=Thermostat");

	assert!(matches!(
		server.invoke(&n, "adjust", vec![Value::Int(1)], &[types::INT]),
		Err(ManagementError::PermissionDenied { action: Action::Invoke, .. })
	));
	assert_eq!(server.get_attribute(&n, "Target").unwrap(), Value::Int(0));
	assert_eq!(server.query_names(Some(&name("app:*")), None).unwrap(), vec![n]);
}

#[test]
fn mbean_queries_are_checked_separately_from_name_queries() {
	let server = server().with_permission_checker(|request: &PermissionRequest<'_>| {
		request.action != Action::QueryMBeans || request.class_name != Some("Hooked")
	});
	thermostat_at(&server, "app:type=Thermostat");
	server
		.register_mbean(Arc::new(Hooked::default()), Some(name("app:type=Hooked")))
		.unwrap();
	let pattern = name("app:*");

	assert_eq!(server.query_names(Some(&pattern), None).unwrap().len(), 2);
	let instances = server.query_mbeans(Some(&pattern), None).unwrap();
	assert_eq!(instances.len(), 1);
	assert_eq!(instances[0].name, name("app:type=Thermostat"));
}

struct ThermostatFactory {
	loader: Arc<ContextLoader>,
}

impl ResourceFactory for ThermostatFactory {
	fn create(&self, args: &[Value]) -> std::result::Result<Arc<dyn ManagedResource>, TargetError> {
		let thermostat = Thermostat::new();
		*thermostat.target.lock() = args.first().and_then(Value::as_int).unwrap_or_default();
		Ok(thermostat as Arc<dyn ManagedResource>)
	}

	fn context_loader(&self) -> Option<Arc<ContextLoader>> {
		Some(Arc::clone(&self.loader))
	}
}

#[test]
fn create_mbean_uses_registered_factories() {
	let server = server();
	let loader = ContextLoader::new("plugins");
	server.register_factory(
		"Thermostat",
		Arc::new(ThermostatFactory {
			loader: Arc::clone(&loader),
		}),
	);
	let n = name("app:type=Created");

	let instance = server
		.create_mbean("Thermostat", Some(n.clone()), &[Value::Int(12)], &[types::INT])
		.unwrap();
	assert_eq!(instance.class_name, "Thermostat");
	assert_eq!(server.get_attribute(&n, "Target").unwrap(), Value::Int(12));
	assert_eq!(server.get_context_loader_for(&n).unwrap().as_deref(), Some(&*loader));

	assert!(matches!(
		server.create_mbean("Toaster", Some(name("app:type=Toaster")), &[], &[]),
		Err(ManagementError::UnknownClass(_))
	));
	assert!(matches!(
		server.create_mbean("Thermostat", Some(name("app:type=Bad")), &[Value::from("x")], &[types::INT]),
		Err(ManagementError::DispatchFailure { .. })
	));
}

#[test]
fn calls_run_under_the_registration_loader() {
	let server = server();
	let loader = ContextLoader::new("deploy");
	let n = name("app:type=Scoped");
	server.register_mbean_in(Thermostat::new(), Some(n.clone()), &loader).unwrap();
	thermostat_at(&server, "app:type=Unscoped");

	assert_eq!(server.invoke(&n, "loader", Vec::new(), &[]).unwrap(), Value::from("deploy"));
	assert_eq!(
		server.invoke(&name("app:type=Unscoped"), "loader", Vec::new(), &[]).unwrap(),
		Value::from("none")
	);
	assert!(crate::context::current().is_none());
	assert!(server.get_context_loader_for(&name("app:type=Unscoped")).unwrap().is_none());
}

#[test]
fn instance_checks_use_declared_types() {
	let server = server();
	thermostat_at(&server, "app:type=Thermostat");
	let n = name("app:type=Thermostat");
	assert!(server.is_instance_of(&n, "Device").unwrap());
	assert!(!server.is_instance_of(&n, "Hooked").unwrap());
}

#[test]
fn hooks_may_call_back_into_the_server() {
	struct Reentrant {
		seen: Mutex<Option<usize>>,
	}

	impl ManagedResource for Reentrant {
		fn interface(self: Arc<Self>) -> ManagementInterface {
			ManagementInterface::new("Reentrant")
				.operation(OperationDef::new("noop", types::VOID, |_| Ok(Value::Null)))
				.attribute(AttributeDef::new("Flag", types::BOOLEAN).getter(|| Ok(Value::Bool(false))))
		}

		fn lifecycle(&self) -> Option<&dyn crate::RegistrationLifecycle> {
			Some(self)
		}
	}

	impl crate::RegistrationLifecycle for Reentrant {
		fn pre_register(
			&self,
			server: &MBeanServer,
			name: Option<&ObjectName>,
		) -> std::result::Result<Option<ObjectName>, TargetError> {
			*self.seen.lock() = Some(server.get_mbean_count());
			Ok(name.cloned())
		}
	}

	let server = server();
	let resource = Arc::new(Reentrant { seen: Mutex::new(None) });
	server
		.register_mbean(Arc::clone(&resource) as Arc<dyn ManagedResource>, Some(name("app:type=Reentrant")))
		.unwrap();
	assert_eq!(*resource.seen.lock(), Some(1));
}
