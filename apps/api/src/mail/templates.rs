use super::OutgoingMail;

pub fn sign_up(to: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Here I Am: Sign Up".to_string(),
        text: "You have successfully signed up to Here I Am!\nWelcome aboard!".to_string(),
    }
}

pub fn forgot_password(to: &str, new_password: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Here I Am: Forgot Password".to_string(),
        text: format!(
            "You have requested to reset your password.\n\
             Your password has been automatically changed to:\n\
             {new_password}\n\
             You can change this password in the profile section after you sign in again."
        ),
    }
}
