use std::path::Path;

use url::Url;

use crate::error::{BoardError, FieldErrors, Result};
use crate::identity::ProfileUpdate;
use crate::image_host::ImageHost;
use crate::session::{CurrentUser, SessionContext};

const INITIALS_AVATAR: &str = "https://ui-avatars.com/api/";

/// A picked avatar file, not yet uploaded.
#[derive(Debug, Clone)]
pub struct AvatarFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AvatarFile {
    pub fn read(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "avatar".to_string());
        Ok(Self {
            file_name,
            bytes: std::fs::read(path)?,
        })
    }
}

/// Editable profile fields. Email is shown but never submitted.
#[derive(Debug, Clone)]
pub struct ProfileForm {
    pub display_name: String,
    pub avatar: Option<AvatarFile>,
}

impl ProfileForm {
    pub fn for_user(user: &CurrentUser) -> Self {
        Self {
            display_name: user.name().to_string(),
            avatar: None,
        }
    }

    /// Uploads the avatar first (as `<uid>-<file name>`), then updates the
    /// identity and the profile document.
    pub fn submit(&self, ctx: &mut SessionContext<'_>, host: Option<&dyn ImageHost>) -> Result<CurrentUser> {
        let display_name = self.display_name.trim();
        if display_name.is_empty() {
            let mut errors = FieldErrors::new();
            errors.add("displayName", "Display name is required.");
            return Err(BoardError::Validation(errors));
        }
        let uid = ctx.require_user()?.uid.clone();
        let photo_url = match &self.avatar {
            Some(file) => {
                let host = host.ok_or_else(|| BoardError::Upload("no image host configured".to_string()))?;
                Some(host.upload(&format!("{}-{}", uid, file.file_name), &file.bytes)?)
            }
            None => None,
        };
        ctx.update_profile(&ProfileUpdate {
            display_name: Some(display_name.to_string()),
            photo_url,
        })
    }
}

/// The user's photo, or a generated initials avatar.
pub fn avatar_url(user: &CurrentUser) -> String {
    if let Some(url) = user.photo_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    match Url::parse_with_params(
        INITIALS_AVATAR,
        &[
            ("name", user.name()),
            ("background", "4F46E5"),
            ("color", "fff"),
            ("size", "128"),
        ],
    ) {
        Ok(url) => url.into(),
        Err(_) => INITIALS_AVATAR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::tests::test_db;
    use crate::identity::LocalIdentity;
    use crate::mailer::MemoryMailer;
    use crate::models::Role;
    use crate::router::tests::user;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHost {
        names: RefCell<Vec<String>>,
    }

    impl ImageHost for RecordingHost {
        fn upload(&self, name: &str, bytes: &[u8]) -> Result<String> {
            assert!(!bytes.is_empty());
            self.names.borrow_mut().push(name.to_string());
            Ok(format!("https://i.ibb.co/{}", name))
        }
    }

    struct FailingHost;

    impl ImageHost for FailingHost {
        fn upload(&self, _name: &str, _bytes: &[u8]) -> Result<String> {
            Err(BoardError::Upload("Invalid API v1 key.".to_string()))
        }
    }

    fn signed_in(db: &Database) -> SessionContext<'_> {
        let idp = LocalIdentity::new(db, None, Box::new(MemoryMailer::new())).unwrap();
        let mut ctx = SessionContext::new(db, Box::new(idp)).unwrap();
        ctx.signup("alice@x.com", "pw123456", "alice").unwrap();
        ctx
    }

    #[test]
    fn test_rename_updates_profile_document() {
        let db = test_db();
        let mut ctx = signed_in(&db);
        let form = ProfileForm {
            display_name: "Alice A.".to_string(),
            avatar: None,
        };
        let updated = form.submit(&mut ctx, None).unwrap();
        assert_eq!(updated.name(), "Alice A.");
        let stored = db.get_user(&updated.uid).unwrap().unwrap();
        assert_eq!(stored.username, "Alice A.");
        assert_eq!(stored.email.as_deref(), Some("alice@x.com"));
    }

    #[test]
    fn test_avatar_uploaded_under_uid_prefixed_name() {
        let db = test_db();
        let mut ctx = signed_in(&db);
        let host = RecordingHost::default();
        let form = ProfileForm {
            display_name: "alice".to_string(),
            avatar: Some(AvatarFile {
                file_name: "me.png".to_string(),
                bytes: vec![0x89, 0x50, 0x4e, 0x47],
            }),
        };
        let updated = form.submit(&mut ctx, Some(&host)).unwrap();
        let expected = format!("{}-me.png", updated.uid);
        assert_eq!(*host.names.borrow(), vec![expected.clone()]);
        assert_eq!(updated.photo_url, Some(format!("https://i.ibb.co/{}", expected)));
        assert_eq!(avatar_url(&updated), format!("https://i.ibb.co/{}", expected));
    }

    #[test]
    fn test_failed_upload_changes_nothing() {
        let db = test_db();
        let mut ctx = signed_in(&db);
        let form = ProfileForm {
            display_name: "new name".to_string(),
            avatar: Some(AvatarFile {
                file_name: "me.png".to_string(),
                bytes: vec![1],
            }),
        };
        let err = form.submit(&mut ctx, Some(&FailingHost)).unwrap_err();
        assert_eq!(err.to_string(), "Image upload failed: Invalid API v1 key.");
        assert_eq!(ctx.user().unwrap().name(), "alice");
    }

    #[test]
    fn test_blank_display_name_is_rejected() {
        let db = test_db();
        let mut ctx = signed_in(&db);
        let form = ProfileForm {
            display_name: "  ".to_string(),
            avatar: None,
        };
        let err = form.submit(&mut ctx, None).unwrap_err();
        match err {
            BoardError::Validation(errors) => {
                assert_eq!(errors.get("displayName"), Some("Display name is required."))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_initials_avatar_fallback() {
        let url = avatar_url(&user(Role::Standard));
        assert_eq!(
            url,
            "https://ui-avatars.com/api/?name=user+one&background=4F46E5&color=fff&size=128"
        );
    }
}
