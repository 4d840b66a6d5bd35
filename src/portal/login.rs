//! Post-login page assessment.

use scraper::{Html, Selector};

/// Page text that only appears once authenticated.
const AUTHENTICATED_TEXT: &[&str] = &["Notas Recebidas", "Notas Emitidas", "Bem-vindo"];

const USER_INFO_SELECTOR: &str = ".user-info";
const LOGOUT_SELECTOR: &str = "button, a";
const LOGOUT_LABEL: &str = "Sair";
const ERROR_SELECTOR: &str = ".alert-danger, .error, .validation-summary-errors";

/// Path fragment of the login form URL.
pub const LOGIN_PATH: &str = "/Login";

/// Result of inspecting the page reached after submitting credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAssessment {
    Authenticated,
    /// Still on the login page; carries the portal's error text when shown.
    Rejected(Option<String>),
}

impl LoginAssessment {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginAssessment::Authenticated)
    }
}

/// Decide whether a login succeeded from the resulting page and URL.
pub fn assess_login(html: &str, current_url: &str) -> LoginAssessment {
    let document = Html::parse_document(html);

    if has_authenticated_marker(&document) || !current_url.contains(LOGIN_PATH) {
        return LoginAssessment::Authenticated;
    }

    LoginAssessment::Rejected(error_message(&document))
}

fn has_authenticated_marker(document: &Html) -> bool {
    let body_text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    if AUTHENTICATED_TEXT.iter().any(|marker| body_text.contains(marker)) {
        return true;
    }

    if let Ok(selector) = Selector::parse(USER_INFO_SELECTOR) {
        if document.select(&selector).next().is_some() {
            return true;
        }
    }

    Selector::parse(LOGOUT_SELECTOR).is_ok_and(|selector| {
        document
            .select(&selector)
            .any(|el| el.text().any(|t| t.contains(LOGOUT_LABEL)))
    })
}

fn error_message(document: &Html) -> Option<String> {
    let selector = Selector::parse(ERROR_SELECTOR).ok()?;
    document
        .select(&selector)
        .map(|el| el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_URL: &str = "https://www.nfse.gov.br/EmissorNacional/Login";

    #[test]
    fn test_marker_text_means_authenticated() {
        let html = "<html><body><nav><a href='/Notas/Recebidas'>Notas Recebidas</a></nav></body></html>";
        assert_eq!(assess_login(html, LOGIN_URL), LoginAssessment::Authenticated);
    }

    #[test]
    fn test_logout_button_means_authenticated() {
        let html = "<html><body><button class='btn'>Sair</button></body></html>";
        assert!(assess_login(html, LOGIN_URL).is_authenticated());
    }

    #[test]
    fn test_leaving_login_url_means_authenticated() {
        let html = "<html><body><p>Carregando</p></body></html>";
        assert!(assess_login(html, "https://www.nfse.gov.br/EmissorNacional/Dashboard").is_authenticated());
    }

    #[test]
    fn test_rejection_carries_error_text() {
        let html = r#"<html><body>
            <form><input id="Inscricao"><input id="Senha"></form>
            <div class="validation-summary-errors"><ul><li>Usuário ou senha inválidos</li></ul></div>
        </body></html>"#;
        assert_eq!(
            assess_login(html, LOGIN_URL),
            LoginAssessment::Rejected(Some("Usuário ou senha inválidos".to_string()))
        );
    }

    #[test]
    fn test_rejection_without_error_text() {
        let html = "<html><body><form><input id='Inscricao'></form></body></html>";
        assert_eq!(assess_login(html, LOGIN_URL), LoginAssessment::Rejected(None));
    }
}
