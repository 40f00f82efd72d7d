use regform::form::{FieldLens, FormModel};

#[derive(Clone, Default, PartialEq, regform::form::FormModel)]
#[form(rename_all = "camelCase")]
struct Contact {
    display_name: String,
    #[form(rename = "mail")]
    email: String,
}

#[derive(Clone, regform::form::FormModel)]
struct SignupForm {
    contact: Contact,
    accepted_terms: bool,
}

fn main() {
    let email = SignupForm::fields()
        .contact()
        .nested(Contact::fields().email());
    let mut model = SignupForm {
        contact: Contact::default(),
        accepted_terms: false,
    };
    email.set(&mut model, "b@example.com".to_string());
    assert_eq!(email.key().path(), "contact.mail");
    assert_eq!(email.get(&model), "b@example.com");
    assert_eq!(
        Contact::fields().display_name().key().path(),
        "displayName"
    );
    assert_eq!(
        SignupForm::fields().accepted_terms().key().path(),
        "accepted_terms"
    );
}
