//! School resource endpoints
//!
//! The backend exposes each table as a conventional REST collection
//! (`/teachers/`, `/teachers/{id}/`, ...). [`Resource`] wraps one collection.

use super::{ApiClient, ClientError, Query};
use crate::types::{
    AcademicSession, ListResponse, MessageResponse, SchoolClass, Section, Subject, Teacher,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::marker::PhantomData;

/// Typed view of one REST collection
#[derive(Debug, Clone)]
pub struct Resource<'a, T> {
    client: &'a ApiClient,
    collection: &'static str,
    _item: PhantomData<T>,
}

impl<'a, T: DeserializeOwned> Resource<'a, T> {
    pub fn new(client: &'a ApiClient, collection: &'static str) -> Self {
        Self {
            client,
            collection,
            _item: PhantomData,
        }
    }

    fn collection_path(&self) -> String {
        format!("/{}/", self.collection)
    }

    fn item_path(&self, id: impl Display) -> String {
        format!("/{}/{id}/", self.collection)
    }

    /// List items, accepting either a bare array or a paginated envelope
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn list(&self, query: Option<&Query>) -> Result<Vec<T>, ClientError> {
        let response: ListResponse<T> = self.client.get(&self.collection_path(), query).await?;
        Ok(response.into_items())
    }

    /// Fetch one item
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn get(&self, id: impl Display) -> Result<T, ClientError> {
        self.client.get(&self.item_path(id), None).await
    }

    /// Create an item
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<T, ClientError> {
        self.client.post(&self.collection_path(), None, Some(body)).await
    }

    /// Partially update an item
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        id: impl Display,
        body: &B,
    ) -> Result<T, ClientError> {
        self.client.patch(&self.item_path(id), None, Some(body)).await
    }

    /// Delete an item
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn delete(&self, id: impl Display) -> Result<(), ClientError> {
        let _: serde_json::Value = self.client.delete(&self.item_path(id)).await?;
        Ok(())
    }
}

impl ApiClient {
    /// Any collection by name, for tables without a dedicated accessor
    pub fn resource<T: DeserializeOwned>(&self, collection: &'static str) -> Resource<'_, T> {
        Resource::new(self, collection)
    }

    pub fn teachers(&self) -> Resource<'_, Teacher> {
        self.resource("teachers")
    }

    pub fn subjects(&self) -> Resource<'_, Subject> {
        self.resource("subjects")
    }

    pub fn classes(&self) -> Resource<'_, SchoolClass> {
        self.resource("classes")
    }

    pub fn sections(&self) -> Resource<'_, Section> {
        self.resource("sections")
    }

    pub fn sessions(&self) -> Resource<'_, AcademicSession> {
        self.resource("sessions")
    }

    /// Send a password reset email to a teacher
    ///
    /// # Errors
    ///
    /// See [`ApiClient::execute`]
    pub async fn reset_teacher_password(
        &self,
        id: impl Display,
    ) -> Result<MessageResponse, ClientError> {
        self.post::<_, ()>(&format!("/teachers/{id}/reset-password/"), None, None)
            .await
    }
}
