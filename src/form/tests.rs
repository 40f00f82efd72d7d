use super::*;
use futures::executor::block_on;
use futures_timer::Delay;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Problem {
    Missing,
    TooShort(usize),
    Mismatch,
    Taken,
    Slow,
}

impl ValidationError for Problem {
    fn message(&self) -> String {
        match self {
            Problem::Missing => "missing".to_string(),
            Problem::TooShort(min) => format!("shorter than {min}"),
            Problem::Mismatch => "does not match".to_string(),
            Problem::Taken => "taken".to_string(),
            Problem::Slow => "check took too long".to_string(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Problem::Missing => "required",
            Problem::TooShort(_) => "minLength",
            Problem::Mismatch => "validate",
            Problem::Taken => "taken",
            Problem::Slow => "timeout",
        }
    }
}

impl From<ValidationTimeout> for Problem {
    fn from(_: ValidationTimeout) -> Self {
        Problem::Slow
    }
}

#[derive(Clone, Debug, Default, PartialEq, regform_derive::FormModel)]
struct Invite {
    code: String,
    referrer: String,
}

#[derive(Clone, Debug, Default, PartialEq, regform_derive::FormModel)]
#[form(rename_all = "camelCase")]
struct Account {
    email: String,
    password: String,
    repeat_password: String,
    referred: bool,
    #[form(rename = "referral")]
    invite: Invite,
}

type AccountForm = FormController<Account, Problem>;

fn email() -> AccountEmailLens {
    AccountEmailLens
}

fn password() -> AccountPasswordLens {
    AccountPasswordLens
}

fn repeat_password() -> AccountRepeatPasswordLens {
    AccountRepeatPasswordLens
}

fn referred() -> AccountReferredLens {
    AccountReferredLens
}

fn invite_code() -> NestedLens<AccountInviteLens, InviteCodeLens> {
    Account::fields().invite().nested(Invite::fields().code())
}

/// Async email check against a fixed set of taken addresses. Each address
/// can be given its own response delay.
#[derive(Clone, Default)]
struct Directory {
    taken: Vec<&'static str>,
    delays: BTreeMap<&'static str, u64>,
    calls: Arc<AtomicUsize>,
}

impl Directory {
    fn new(taken: &[&'static str]) -> Self {
        Self {
            taken: taken.to_vec(),
            ..Self::default()
        }
    }

    fn slow_for(mut self, email: &'static str, delay_ms: u64) -> Self {
        self.delays.insert(email, delay_ms);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AsyncFieldValidator<Account, AccountEmailLens, Problem> for Directory {
    type Fut<'a>
        = BoxedValidationFuture<'a, Problem>
    where
        Self: 'a;

    fn validate<'a>(&'a self, _model: &'a Account, value: &'a String) -> Self::Fut<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay_ms) = self.delays.get(value.as_str()) {
                Delay::new(Duration::from_millis(*delay_ms)).await;
            }
            if self.taken.iter().any(|taken| *taken == value.as_str()) {
                Err(Problem::Taken)
            } else {
                Ok(())
            }
        })
    }
}

fn signup_options() -> FormOptions {
    FormOptions {
        validate_first_error_only: true,
        submit_requires_dirty: true,
        ..FormOptions::default()
    }
}

/// Email and password rules, a confirmation tied to the password and an
/// invite code that only counts when the account is referred.
fn account_form(options: FormOptions) -> AccountForm {
    let form = FormController::new(Account::default(), options);
    form.register_field_label(email(), "Email").expect("label");
    form.register_required_field(email()).expect("required");
    form.register_field_validator(email(), rules::required::<Account, _>(Problem::Missing))
        .expect("email rule");
    form.register_field_validator(password(), rules::required::<Account, _>(Problem::Missing))
        .expect("password rule");
    form.register_field_validator(
        password(),
        rules::min_length::<Account, _>(6, Problem::TooShort(6)),
    )
    .expect("length rule");
    form.register_field_validator(
        repeat_password(),
        rules::equals_field::<Account, _, _>(password(), Problem::Mismatch),
    )
    .expect("repeat rule");
    form.register_dependency(password(), repeat_password())
        .expect("dependency");
    form.register_field_validator(invite_code(), rules::required::<Account, _>(Problem::Missing))
        .expect("invite rule");
    form.register_enabled_when(Account::fields().invite(), |account: &Account| {
        account.referred
    })
    .expect("enablement");
    form
}

fn with_directory(directory: Directory) -> AccountForm {
    let form = account_form(signup_options());
    form.register_async_field_validator(email(), directory)
        .expect("directory check");
    form
}

fn fill(form: &AccountForm, address: &str) {
    form.set(email(), address.to_string()).expect("email");
    form.set(password(), "hunter22".to_string()).expect("password");
    form.set(repeat_password(), "hunter22".to_string())
        .expect("repeat");
}

fn error_of<L: FieldLens<Account>>(form: &AccountForm, lens: L) -> Option<Problem> {
    form.field_meta(lens)
        .expect("meta")
        .and_then(|meta| meta.errors.first().cloned())
}

fn spawn_submit(
    form: &AccountForm,
    received: Arc<Mutex<Vec<Account>>>,
) -> thread::JoinHandle<FormResult<SubmitOutcome>> {
    let form = form.clone();
    thread::spawn(move || {
        block_on(form.submit_async(
            move |account: Account| async move {
                received.lock().expect("received").push(account);
                Ok::<(), FormError>(())
            },
            |_errors| {},
        ))
    })
}

#[test]
fn keys_join_renamed_and_nested_segments() {
    let key = invite_code().key();
    assert_eq!(key.path(), "referral.code");
    assert_eq!(key.segments(), &["referral", "code"]);
    assert!(key.matches("referral.code"));
    assert!(!key.matches("referral"));
    assert!(!key.matches("referral.code.extra"));
    assert_eq!(repeat_password().key().to_string(), "repeatPassword");

    let scope = Account::fields().invite().key();
    assert!(scope.contains(&key));
    assert!(scope.contains(&scope));
    assert!(!key.contains(&scope));
    assert!(!email().key().contains(&key));
}

#[test]
#[should_panic(expected = "limited to four segments")]
fn keys_deeper_than_four_segments_panic() {
    let deep = FieldKey::new("a").join(FieldKey::new("b").join(FieldKey::new("c")));
    let _ = deep.join(FieldKey::new("d").join(FieldKey::new("e")));
}

#[test]
fn nested_writes_reach_the_model_and_mark_only_that_path_dirty() {
    let form = account_form(signup_options());
    form.set(invite_code(), "WELCOME".to_string()).expect("set");

    assert_eq!(form.values().expect("values").invite.code, "WELCOME");
    assert_eq!(form.get(invite_code()).expect("get"), "WELCOME");
    assert!(form.field_meta(invite_code()).expect("meta").expect("meta").dirty);
    assert!(form.field_meta(email()).expect("meta").is_none());
    assert!(form.form_state().expect("state").is_dirty);

    form.set(invite_code(), String::new()).expect("back to initial");
    assert!(!form.field_meta(invite_code()).expect("meta").expect("meta").dirty);
    assert!(!form.form_state().expect("state").is_dirty);
}

#[test]
fn on_submit_mode_stays_quiet_until_the_first_attempt() {
    let form = account_form(signup_options());
    form.set(password(), "abc".to_string()).expect("set");
    form.touch(password()).expect("touch");
    assert_eq!(error_of(&form, password()), None);

    form.set(email(), "a@b.co".to_string()).expect("dirty");
    let outcome = form.submit(|_| Ok(()), |_| {}).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(error_of(&form, password()), Some(Problem::TooShort(6)));

    form.set(password(), "abcdef".to_string()).expect("fix");
    assert_eq!(error_of(&form, password()), None);
}

#[test]
fn blur_mode_validates_when_a_field_is_left() {
    let form = account_form(FormOptions {
        validate_mode: ValidationMode::OnBlur,
        ..signup_options()
    });
    form.set(email(), String::new()).expect("set");
    assert_eq!(error_of(&form, email()), None);

    form.touch(email()).expect("touch");
    assert_eq!(error_of(&form, email()), Some(Problem::Missing));
    assert!(form.field_meta(email()).expect("meta").expect("meta").touched);
}

#[test]
fn only_the_first_failing_rule_is_kept_unless_configured() {
    let collect_all = account_form(FormOptions {
        validate_mode: ValidationMode::OnChange,
        validate_first_error_only: false,
        ..signup_options()
    });
    collect_all.register_field_validator(
        password(),
        |_: &Account, value: &String| {
            if value.contains('!') {
                Ok(())
            } else {
                Err(Problem::Mismatch)
            }
        },
    )
    .expect("extra rule");
    collect_all.set(password(), "abc".to_string()).expect("set");
    let errors = collect_all
        .field_meta(password())
        .expect("meta")
        .expect("meta")
        .errors;
    assert_eq!(errors, vec![Problem::TooShort(6), Problem::Mismatch]);
    assert_eq!(
        collect_all.errors().expect("errors").get("password"),
        Some(&Problem::TooShort(6))
    );
}

#[test]
fn editing_the_password_revalidates_its_confirmation() {
    let form = account_form(signup_options());
    fill(&form, "a@b.co");
    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect("submit"),
        SubmitOutcome::Submitted
    );

    form.set(password(), "hunter23".to_string()).expect("edit");
    assert_eq!(error_of(&form, repeat_password()), Some(Problem::Mismatch));
    form.set(repeat_password(), "hunter23".to_string())
        .expect("repeat");
    assert_eq!(error_of(&form, repeat_password()), None);
}

#[test]
fn confirmation_is_not_checked_early_in_on_submit_mode() {
    let form = account_form(signup_options());
    form.set(password(), "hunter22".to_string()).expect("set");
    form.set(repeat_password(), "other".to_string()).expect("set");
    form.set(password(), "hunter23".to_string()).expect("set");
    assert!(form.errors().expect("errors").is_empty());
}

#[test]
fn disabled_scope_is_skipped_and_its_errors_dropped() {
    let form = account_form(signup_options());
    fill(&form, "a@b.co");
    form.set(referred(), true).expect("referred");
    assert!(form.is_enabled(invite_code()).expect("enabled"));

    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect("submit"),
        SubmitOutcome::Invalid
    );
    assert_eq!(error_of(&form, invite_code()), Some(Problem::Missing));

    form.set(referred(), false).expect("not referred");
    assert!(!form.is_enabled(invite_code()).expect("enabled"));
    assert_eq!(error_of(&form, invite_code()), None);
    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect("submit"),
        SubmitOutcome::Submitted
    );
}

#[test]
fn disabled_fields_are_not_required_in_their_view() {
    let form = account_form(signup_options());
    form.register_required_field(invite_code()).expect("required");

    let view = form.field_view(invite_code()).expect("view");
    assert!(view.disabled);
    assert!(!view.required);

    form.set(referred(), true).expect("referred");
    let view = form.field_view(invite_code()).expect("view");
    assert!(!view.disabled);
    assert!(view.required);
}

#[test]
fn watchers_see_nested_edits_and_resets_until_removed() {
    let form = account_form(signup_options());
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = seen.clone();
    let id = form
        .watch(Account::fields().invite(), move |invite: &Invite| {
            sink.lock().expect("seen").push(invite.code.clone());
        })
        .expect("watch");

    form.set(invite_code(), "A1".to_string()).expect("set");
    form.set(email(), "a@b.co".to_string()).expect("unrelated");
    form.reset_to_initial().expect("reset");
    assert_eq!(*seen.lock().expect("seen"), vec!["A1".to_string(), String::new()]);

    assert!(form.unwatch(id).expect("unwatch"));
    assert!(!form.unwatch(id).expect("second unwatch"));
    form.set(invite_code(), "B2".to_string()).expect("set");
    assert_eq!(seen.lock().expect("seen").len(), 2);
}

#[test]
fn lookup_waits_for_the_sync_rules_of_its_field() {
    let directory = Directory::new(&[]);
    let form = with_directory(directory.clone());
    form.set(email(), String::new()).expect("set");

    assert!(!block_on(form.validate_form_async()).expect("validate"));
    assert_eq!(directory.calls(), 0);
    assert_eq!(error_of(&form, email()), Some(Problem::Missing));

    fill(&form, "taken@b.co");
    assert!(block_on(form.validate_form_async()).expect("validate"));
    assert_eq!(error_of(&form, email()), None);
}

#[test]
fn registered_addresses_fail_the_lookup() {
    let directory = Directory::new(&["taken@b.co"]);
    let form = with_directory(directory.clone());
    fill(&form, "taken@b.co");

    assert!(!block_on(form.validate_form_async()).expect("validate"));
    assert_eq!(directory.calls(), 1);
    assert_eq!(error_of(&form, email()), Some(Problem::Taken));
    assert_eq!(form.errors().expect("errors").message("email").as_deref(), Some("taken"));
}

#[test]
fn an_edit_discards_the_lookup_already_running() {
    let directory = Directory::new(&["taken@b.co"]).slow_for("taken@b.co", 120);
    let form = with_directory(directory.clone());
    form.set(email(), "taken@b.co".to_string()).expect("set");

    let checker = form.clone();
    let running = thread::spawn(move || {
        block_on(checker.validate_field_async_registered(email())).expect("check")
    });
    thread::sleep(Duration::from_millis(30));
    assert!(form.field_meta(email()).expect("meta").expect("meta").validating);
    form.set(email(), "free@b.co".to_string()).expect("edit");

    let tickets = running.join().expect("join");
    assert_eq!(tickets.len(), 1);
    let meta = form.field_meta(email()).expect("meta").expect("meta");
    assert!(meta.errors.is_empty());
    assert!(!meta.validating);
}

#[test]
fn ad_hoc_async_check_keeps_only_the_newest_result() {
    let form = account_form(signup_options());
    form.set(email(), "first@b.co".to_string()).expect("set");

    let older = Directory::new(&["first@b.co"]).slow_for("first@b.co", 100);
    let checker = form.clone();
    let running = thread::spawn(move || {
        block_on(checker.validate_field_async(email(), &older)).expect("older")
    });
    thread::sleep(Duration::from_millis(20));
    let newer = Directory::new(&[]);
    let newest = block_on(form.validate_field_async(email(), &newer)).expect("newer");

    let stale = running.join().expect("join");
    assert!(stale < newest);
    assert_eq!(error_of(&form, email()), None);
}

#[test]
fn debounced_lookup_skips_superseded_values() {
    let directory = Directory::new(&[]);
    let form = account_form(FormOptions {
        validate_mode: ValidationMode::OnChange,
        ..signup_options()
    });
    form.register_async_field_validator_with_debounce(email(), 60, directory.clone())
        .expect("debounced");

    let typist = form.clone();
    let first = thread::spawn(move || block_on(typist.set_async(email(), "a@b".to_string())));
    thread::sleep(Duration::from_millis(15));
    block_on(form.set_async(email(), "a@b.co".to_string())).expect("second");
    first.join().expect("join").expect("first");

    assert_eq!(directory.calls(), 1);
    assert!(!form.field_meta(email()).expect("meta").expect("meta").validating);
}

#[test]
fn slow_lookup_fails_the_field_with_a_timeout() {
    let directory = Directory::new(&[]).slow_for("a@b.co", 500);
    let form = account_form(signup_options());
    form.register_async_field_validator_with_timeout(
        email(),
        0,
        Duration::from_millis(40),
        directory,
    )
    .expect("timeout");
    fill(&form, "a@b.co");

    let outcome = block_on(form.submit_async(
        |_| async { Ok::<(), FormError>(()) },
        |_errors| {},
    ))
    .expect("submit");
    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(error_of(&form, email()), Some(Problem::Slow));
}

#[test]
fn form_level_rules_report_against_a_field() {
    let form = account_form(signup_options());
    form.register_form_validator(|account: &Account| {
        if account.password.contains(&account.email) && !account.email.is_empty() {
            vec![(password().key(), Problem::Mismatch)]
        } else {
            Vec::new()
        }
    })
    .expect("form rule");
    form.set(email(), "sam".to_string()).expect("email");
    form.set(password(), "sam-secret".to_string()).expect("password");
    form.set(repeat_password(), "sam-secret".to_string())
        .expect("repeat");

    assert!(!form.validate_form().expect("validate"));
    assert_eq!(form.first_error().expect("first"), Some(password().key()));
    assert_eq!(error_of(&form, password()), Some(Problem::Mismatch));
}

#[test]
fn successful_submit_hands_over_values_and_counts_attempts() {
    let form = account_form(signup_options());
    fill(&form, "a@b.co");
    let received = Arc::new(Mutex::new(None));
    let sink = received.clone();

    let outcome = form
        .submit(
            move |account| {
                *sink.lock().expect("sink") = Some(account);
                Ok(())
            },
            |_| panic!("valid form reported errors"),
        )
        .expect("submit");

    assert_eq!(outcome, SubmitOutcome::Submitted);
    assert_eq!(
        received.lock().expect("received").as_ref().map(|a| a.email.clone()),
        Some("a@b.co".to_string())
    );
    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Succeeded);
    assert_eq!(snapshot.submit_count, 1);
    assert!(snapshot.form_state().is_submitted);
    assert!(form.can_submit().expect("gate"));
}

#[test]
fn rejected_submit_passes_first_errors_per_field() {
    let form = account_form(signup_options());
    form.set(password(), "abc".to_string()).expect("set");
    let reported = Arc::new(Mutex::new(FieldErrors::default()));
    let sink = reported.clone();

    let outcome = form
        .submit(
            |_| panic!("invalid form was submitted"),
            move |errors| *sink.lock().expect("sink") = errors,
        )
        .expect("submit");

    assert_eq!(outcome, SubmitOutcome::Invalid);
    let errors = reported.lock().expect("reported").clone();
    assert_eq!(errors.get("email"), Some(&Problem::Missing));
    assert_eq!(errors.get("password"), Some(&Problem::TooShort(6)));
    assert_eq!(errors.get("repeatPassword"), Some(&Problem::Mismatch));
    assert!(!errors.contains("referral.code"));
    assert_eq!(form.snapshot().expect("snapshot").submit_state, SubmitState::Failed);
    assert_eq!(form.first_error().expect("first"), Some(email().key()));
}

#[test]
fn handler_error_fails_the_submit_and_surfaces() {
    let form = account_form(signup_options());
    fill(&form, "a@b.co");
    let error = form
        .submit(|_| Err(FormError::UnknownField("server".into())), |_| {})
        .expect_err("handler error is returned");
    assert_eq!(error, FormError::UnknownField("server".into()));
    assert_eq!(form.snapshot().expect("snapshot").submit_state, SubmitState::Failed);

    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect("retry"),
        SubmitOutcome::Submitted
    );
}

#[test]
fn untouched_form_cannot_be_submitted() {
    let form = account_form(signup_options());
    assert!(!form.can_submit().expect("gate"));
    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect_err("gate"),
        FormError::NotDirty
    );
    assert_eq!(form.form_state().expect("state").submit_count, 0);

    let relaxed = account_form(FormOptions {
        submit_requires_dirty: false,
        ..signup_options()
    });
    assert!(relaxed.can_submit().expect("gate"));
}

#[test]
fn a_running_submit_blocks_another() {
    let directory = Directory::new(&[]).slow_for("a@b.co", 120);
    let form = with_directory(directory);
    fill(&form, "a@b.co");

    let first = spawn_submit(&form, Arc::new(Mutex::new(Vec::new())));
    thread::sleep(Duration::from_millis(30));
    assert!(form.form_state().expect("state").is_submitting);
    assert!(!form.can_submit().expect("gate"));
    assert_eq!(
        form.submit(|_| Ok(()), |_| {}).expect_err("second submit"),
        FormError::AlreadySubmitting
    );

    assert_eq!(first.join().expect("join"), Ok(SubmitOutcome::Submitted));
}

#[test]
fn submit_rechecks_an_email_edited_during_its_lookup() {
    let directory = Directory::new(&["taken@b.co"]).slow_for("free@b.co", 120);
    let form = with_directory(directory.clone());
    fill(&form, "free@b.co");
    let received = Arc::new(Mutex::new(Vec::new()));

    let running = spawn_submit(&form, received.clone());
    thread::sleep(Duration::from_millis(40));
    form.set(email(), "taken@b.co".to_string()).expect("edit");

    assert_eq!(running.join().expect("join"), Ok(SubmitOutcome::Invalid));
    assert!(received.lock().expect("received").is_empty());
    assert_eq!(error_of(&form, email()), Some(Problem::Taken));
    assert_eq!(directory.calls(), 2);
    assert_eq!(form.snapshot().expect("snapshot").submit_state, SubmitState::Failed);
}

#[test]
fn submit_started_after_a_reset_owns_the_form_state() {
    let directory = Directory::new(&[])
        .slow_for("first@b.co", 100)
        .slow_for("second@b.co", 400);
    let form = with_directory(directory);
    fill(&form, "first@b.co");
    let received = Arc::new(Mutex::new(Vec::new()));

    let abandoned = spawn_submit(&form, received.clone());
    thread::sleep(Duration::from_millis(30));
    form.reset_to_initial().expect("reset");
    fill(&form, "second@b.co");
    let current = spawn_submit(&form, received.clone());

    assert_eq!(abandoned.join().expect("join"), Ok(SubmitOutcome::Cancelled));
    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.submit_state, SubmitState::Validating);
    assert_eq!(snapshot.submit_count, 1);
    assert!(received.lock().expect("received").is_empty());

    assert_eq!(current.join().expect("join"), Ok(SubmitOutcome::Submitted));
    let received = received.lock().expect("received");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].email, "second@b.co");
    assert_eq!(form.snapshot().expect("snapshot").submit_state, SubmitState::Succeeded);
}

#[test]
fn edits_mark_lookup_fields_unverified_until_checked() {
    let directory = Directory::new(&[]);
    let form = with_directory(directory);
    form.set(email(), "a@b.co".to_string()).expect("set");
    form.set(password(), "hunter22".to_string()).expect("set");

    assert!(form.field_view(email()).expect("view").unverified);
    assert!(!form.field_view(password()).expect("view").unverified);

    block_on(form.validate_field_async_registered(email())).expect("check");
    assert!(!form.field_view(email()).expect("view").unverified);

    form.set(email(), "c@d.co".to_string()).expect("set");
    form.reset_field(email()).expect("reset field");
    assert!(!form.field_view(email()).expect("view").unverified);
}

#[test]
fn reset_restores_initial_values_and_a_fresh_submit_state() {
    let form = account_form(signup_options());
    form.set(password(), "abc".to_string()).expect("set");
    form.touch(password()).expect("touch");
    let _ = form.submit(|_| Ok(()), |_| {}).expect("submit");
    let before = form.revision().expect("revision");

    form.reset_to_initial().expect("reset");
    let snapshot = form.snapshot().expect("snapshot");
    assert_eq!(snapshot.model, Account::default());
    assert_eq!(snapshot.submit_state, SubmitState::Idle);
    assert_eq!(snapshot.submit_count, 0);
    assert!(snapshot.is_valid);
    assert!(!snapshot.is_dirty);
    assert!(snapshot.field_meta.values().all(|meta| !meta.touched && !meta.dirty));
    assert!(form.revision().expect("revision") > before);
    assert_eq!(form.first_error().expect("first"), None);
}

#[test]
fn single_field_reset_and_error_clearing() {
    let form = account_form(signup_options());
    form.set(email(), "a@b.co".to_string()).expect("set");
    form.set(password(), "abc".to_string()).expect("set");
    let _ = form.submit(|_| Ok(()), |_| {}).expect("submit");

    form.reset_field(email()).expect("reset field");
    assert_eq!(form.get(email()).expect("get"), "");
    assert_eq!(error_of(&form, email()), None);
    assert_eq!(error_of(&form, password()), Some(Problem::TooShort(6)));

    form.clear_field_errors(password()).expect("clear one");
    assert_eq!(error_of(&form, password()), None);
    assert_eq!(form.first_error().expect("first"), Some(repeat_password().key()));

    form.clear_errors().expect("clear all");
    assert!(form.errors().expect("errors").is_empty());
    assert!(form.form_state().expect("state").is_valid);
}

#[test]
fn errors_show_in_views_after_blur_or_submit() {
    let form = account_form(FormOptions {
        validate_mode: ValidationMode::OnChange,
        ..signup_options()
    });
    form.set(email(), String::new()).expect("set");
    form.set(password(), "abc".to_string()).expect("set");
    assert_eq!(error_of(&form, email()), Some(Problem::Missing));
    assert_eq!(form.field_error_for_display(email()).expect("display"), None);

    form.touch(email()).expect("touch");
    let view = form.field_view(email()).expect("view");
    assert_eq!(view.error.as_deref(), Some("missing"));
    assert_eq!(view.label.as_deref(), Some("Email"));
    assert!(view.required);
    assert!(view.touched);
    assert_eq!(form.field_error_for_display(password()).expect("display"), None);

    let _ = form.submit(|_| Ok(()), |_| {}).expect("submit");
    assert_eq!(
        form.field_error_for_display(password()).expect("display").as_deref(),
        Some("shorter than 6")
    );
}

#[test]
fn labels_and_required_flags_can_be_withdrawn() {
    let form = account_form(signup_options());
    assert_eq!(form.field_label(email()).expect("label").as_deref(), Some("Email"));
    assert_eq!(form.field_label(password()).expect("label"), None);
    assert!(form.is_required(email()).expect("required"));

    form.unregister_required_field(email()).expect("unregister");
    assert!(!form.is_required(email()).expect("required"));
    assert!(!form.field_view(email()).expect("view").required);
}

#[test]
fn nested_errors_render_as_json_objects() {
    let form = account_form(signup_options());
    form.set(referred(), true).expect("referred");
    let _ = form.submit(|_| Ok(()), |_| {}).expect("submit");

    let json = form.errors().expect("errors").to_json();
    assert_eq!(
        json["referral"]["code"],
        serde_json::json!({ "type": "required", "message": "missing" })
    );
    assert_eq!(json["email"]["type"], "required");
    assert_eq!(json["password"]["type"], "required");
    assert!(json.get("repeatPassword").is_none());
}

#[test]
fn revision_moves_with_every_visible_change() {
    let form = account_form(signup_options());
    let start = form.revision().expect("revision");
    form.set(email(), "a@b.co".to_string()).expect("set");
    let after_set = form.revision().expect("revision");
    assert!(after_set > start);

    assert_eq!(form.revision().expect("revision"), after_set);
    form.touch(email()).expect("touch");
    assert!(form.revision().expect("revision") > after_set);
}
