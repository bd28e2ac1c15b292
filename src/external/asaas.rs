use super::gateway::{
    CardCredentials, ChargeSpec, CreatedSubscription, CustomerProfile, ExternalSubscription,
    GatewayError, GatewayPayment, InstantPaymentCode, PaymentGateway, SubscriptionSpec,
};
use crate::config::AsaasConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardInfo {
    credit_card_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRecord {
    id: String,
    #[serde(default)]
    status: Option<String>,
    credit_card: Option<CardInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRecord {
    id: String,
    status: String,
    value: f64,
    due_date: Option<String>,
    invoice_url: Option<String>,
    credit_card: Option<CardInfo>,
}

impl From<PaymentRecord> for GatewayPayment {
    fn from(p: PaymentRecord) -> Self {
        GatewayPayment {
            id: p.id,
            status: p.status,
            value_cents: value_to_cents(p.value),
            due_date: p
                .due_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            invoice_url: p.invoice_url,
            card_token: p.credit_card.and_then(|c| c.credit_card_token),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixQrCodeRecord {
    encoded_image: String,
    payload: String,
    expiration_date: Option<String>,
}

pub(crate) fn cents_to_value(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub(crate) fn value_to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

fn apply_card(body: &mut Value, card: Option<&CardCredentials>) {
    match card {
        Some(CardCredentials::Raw { card, holder }) => {
            body["creditCard"] = json!({
                "holderName": card.holder_name,
                "number": card.number,
                "expiryMonth": card.expiry_month,
                "expiryYear": card.expiry_year,
                "ccv": card.ccv,
            });
            body["creditCardHolderInfo"] = json!({
                "name": holder.name,
                "email": holder.email,
                "cpfCnpj": holder.tax_id,
                "postalCode": holder.postal_code,
                "addressNumber": holder.address_number,
                "phone": holder.phone,
            });
        }
        Some(CardCredentials::Token(token)) => {
            body["creditCardToken"] = json!(token);
        }
        None => {}
    }
}

/// Asaas v3 REST client.
#[derive(Clone)]
pub struct AsaasClient {
    http: Client,
    config: AsaasConfig,
}

impl AsaasClient {
    pub fn new(config: AsaasConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .user_agent("billing-backend/asaas")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        label: &str,
    ) -> Result<T, GatewayError> {
        log::debug!("[Asaas] {label}");
        let resp = builder
            .header("access_token", &self.config.api_key)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            log::error!("[Asaas] {label} failed with {status}: {text}");
            let description = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.errors.into_iter().find_map(|e| e.description))
                .unwrap_or_else(|| "Payment gateway request failed".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                description,
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(format!("{label}: {e}")))
    }

    async fn find_customer(&self, tax_id: &str) -> Result<Option<String>, GatewayError> {
        let list: ListResponse<CustomerRecord> = self
            .send(
                self.http
                    .get(self.url("/customers"))
                    .query(&[("cpfCnpj", tax_id)]),
                "GET /customers",
            )
            .await?;
        Ok(list.data.into_iter().next().map(|c| c.id))
    }
}

#[async_trait]
impl PaymentGateway for AsaasClient {
    async fn create_or_get_customer(
        &self,
        profile: &CustomerProfile,
    ) -> Result<String, GatewayError> {
        if let Some(id) = self.find_customer(&profile.tax_id).await? {
            return Ok(id);
        }

        let body = json!({
            "name": profile.name,
            "cpfCnpj": profile.tax_id,
            "email": profile.email,
            "mobilePhone": profile.mobile_phone,
            "externalReference": profile.external_reference,
            "notificationDisabled": false,
        });
        let created: CustomerRecord = self
            .send(
                self.http.post(self.url("/customers")).json(&body),
                "POST /customers",
            )
            .await?;
        Ok(created.id)
    }

    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Result<CreatedSubscription, GatewayError> {
        let mut body = json!({
            "customer": spec.customer_id,
            "billingType": spec.billing_method.gateway_billing_type(),
            "value": cents_to_value(spec.value_cents),
            "nextDueDate": spec.next_due_date.format("%Y-%m-%d").to_string(),
            "cycle": spec.cycle.gateway_cycle(),
            "description": spec.description,
            "externalReference": spec.external_reference,
        });
        apply_card(&mut body, spec.card.as_ref());

        let created: SubscriptionRecord = self
            .send(
                self.http.post(self.url("/subscriptions")).json(&body),
                "POST /subscriptions",
            )
            .await?;
        Ok(CreatedSubscription {
            id: created.id,
            card_token: created.credit_card.and_then(|c| c.credit_card_token),
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        let _: IgnoredAny = self
            .send(
                self.http
                    .delete(self.url(&format!("/subscriptions/{subscription_id}"))),
                "DELETE /subscriptions/{id}",
            )
            .await?;
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ExternalSubscription, GatewayError> {
        let record: SubscriptionRecord = self
            .send(
                self.http
                    .get(self.url(&format!("/subscriptions/{subscription_id}"))),
                "GET /subscriptions/{id}",
            )
            .await?;
        let status = record
            .status
            .ok_or_else(|| GatewayError::Decode("subscription without status".to_string()))?;
        Ok(ExternalSubscription {
            id: record.id,
            status,
        })
    }

    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let list: ListResponse<PaymentRecord> = self
            .send(
                self.http
                    .get(self.url(&format!("/subscriptions/{subscription_id}/payments"))),
                "GET /subscriptions/{id}/payments",
            )
            .await?;
        Ok(list.data.into_iter().map(GatewayPayment::from).collect())
    }

    async fn create_charge(&self, spec: &ChargeSpec) -> Result<GatewayPayment, GatewayError> {
        let mut body = json!({
            "customer": spec.customer_id,
            "billingType": spec.billing_method.gateway_billing_type(),
            "value": cents_to_value(spec.value_cents),
            "dueDate": spec.due_date.format("%Y-%m-%d").to_string(),
            "description": spec.description,
            "externalReference": spec.external_reference,
        });
        apply_card(&mut body, spec.card.as_ref());

        let record: PaymentRecord = self
            .send(
                self.http.post(self.url("/payments")).json(&body),
                "POST /payments",
            )
            .await?;
        Ok(record.into())
    }

    async fn cancel_charge(&self, payment_id: &str) -> Result<(), GatewayError> {
        let _: IgnoredAny = self
            .send(
                self.http.delete(self.url(&format!("/payments/{payment_id}"))),
                "DELETE /payments/{id}",
            )
            .await?;
        Ok(())
    }

    async fn get_instant_payment_code(
        &self,
        payment_id: &str,
    ) -> Result<InstantPaymentCode, GatewayError> {
        let record: PixQrCodeRecord = self
            .send(
                self.http
                    .get(self.url(&format!("/payments/{payment_id}/pixQrCode"))),
                "GET /payments/{id}/pixQrCode",
            )
            .await?;
        Ok(InstantPaymentCode {
            encoded_image: record.encoded_image,
            payload: record.payload,
            expiration_date: record.expiration_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BillingCycle, BillingMethod};
    use crate::external::gateway::CreditCard;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> AsaasClient {
        AsaasClient::new(AsaasConfig {
            api_key: "test-key".into(),
            base_url: server.url(),
            webhook_token: "whk".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(cents_to_value(5667), 56.67);
        assert_eq!(value_to_cents(56.67), 5667);
        assert_eq!(value_to_cents(0.1 + 0.2), 30);
    }

    #[test]
    fn test_list_without_data_is_empty() {
        let customers: ListResponse<CustomerRecord> = serde_json::from_str("{}").unwrap();
        assert!(customers.data.is_empty());
        let payments: ListResponse<PaymentRecord> =
            serde_json::from_str(r#"{"totalCount":0}"#).unwrap();
        assert!(payments.data.is_empty());
    }

    #[tokio::test]
    async fn test_existing_customer_is_reused() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/customers")
            .match_query(Matcher::UrlEncoded("cpfCnpj".into(), "12345678901".into()))
            .match_header("access_token", "test-key")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"cus_1"}]}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/customers")
            .expect(0)
            .create_async()
            .await;

        let id = client_for(&server)
            .create_or_get_customer(&CustomerProfile {
                name: "ACME".into(),
                tax_id: "12345678901".into(),
                email: "billing@acme.test".into(),
                mobile_phone: None,
                external_reference: "1".into(),
            })
            .await
            .unwrap();

        assert_eq!(id, "cus_1");
        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_subscription_body_and_card_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/subscriptions")
            .match_body(Matcher::PartialJson(json!({
                "customer": "cus_1",
                "billingType": "CREDIT_CARD",
                "value": 90.0,
                "nextDueDate": "2024-06-02",
                "cycle": "SEMIANNUALLY",
                "creditCard": { "number": "4111111111111111" }
            })))
            .with_status(200)
            .with_body(r#"{"id":"sub_9","creditCard":{"creditCardToken":"tok_abc"}}"#)
            .create_async()
            .await;

        let created = client_for(&server)
            .create_subscription(&SubscriptionSpec {
                customer_id: "cus_1".into(),
                billing_method: BillingMethod::CreditCard,
                value_cents: 9000,
                next_due_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
                cycle: BillingCycle::Semiannual,
                description: "Plano pro".into(),
                external_reference: "1".into(),
                card: Some(CardCredentials::Raw {
                    card: CreditCard {
                        holder_name: "Maria".into(),
                        number: "4111111111111111".into(),
                        expiry_month: "12".into(),
                        expiry_year: "2030".into(),
                        ccv: "123".into(),
                    },
                    holder: crate::external::gateway::CardHolderInfo {
                        name: "Maria".into(),
                        email: "m@acme.test".into(),
                        tax_id: "12345678901".into(),
                        postal_code: "01001000".into(),
                        address_number: "10".into(),
                        phone: "11999999999".into(),
                    },
                }),
            })
            .await
            .unwrap();

        assert_eq!(created.id, "sub_9");
        assert_eq!(created.card_token.as_deref(), Some("tok_abc"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_description_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/payments")
            .with_status(400)
            .with_body(r#"{"errors":[{"code":"invalid_creditCard","description":"Cartão recusado"}]}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .create_charge(&ChargeSpec {
                customer_id: "cus_1".into(),
                billing_method: BillingMethod::CreditCard,
                value_cents: 5667,
                due_date: NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(),
                description: "upgrade".into(),
                external_reference: "UPGRADE_1".into(),
                card: Some(CardCredentials::Token("tok".into())),
            })
            .await
            .unwrap_err();

        match err {
            GatewayError::Api {
                status,
                description,
            } => {
                assert_eq!(status, 400);
                assert_eq!(description, "Cartão recusado");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_payments_are_converted_to_cents() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/subscriptions/sub_1/payments")
            .with_status(200)
            .with_body(
                r#"{"data":[{"id":"pay_1","status":"PENDING","value":49.9,"dueDate":"2024-05-08","invoiceUrl":"https://inv"}]}"#,
            )
            .create_async()
            .await;

        let payments = client_for(&server)
            .list_subscription_payments("sub_1")
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].value_cents, 4990);
        assert!(payments[0].is_pending());
        assert_eq!(
            payments[0].due_date,
            NaiveDate::from_ymd_opt(2024, 5, 8)
        );
    }

    #[tokio::test]
    async fn test_cancel_subscription_uses_delete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/subscriptions/sub_1")
            .with_status(200)
            .with_body(r#"{"deleted":true,"id":"sub_1"}"#)
            .create_async()
            .await;

        client_for(&server).cancel_subscription("sub_1").await.unwrap();
        mock.assert_async().await;
    }
}
