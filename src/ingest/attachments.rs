use crate::chat::{AttachmentRef, ChatTurn};

/// PDF attachments of a turn, in the order the transport delivered them.
pub fn pdf_attachments(turn: &ChatTurn) -> Vec<AttachmentRef> {
    turn.attachments
        .iter()
        .filter(|attachment| is_pdf_path(attachment))
        .cloned()
        .collect()
}

fn is_pdf_path(attachment: &AttachmentRef) -> bool {
    let path = attachment.path.to_string_lossy();
    !path.trim().is_empty() && path.to_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_pdf_paths_in_order() {
        let turn = ChatTurn::new("see attached")
            .with_attachment(AttachmentRef::new("/tmp/b.PDF"))
            .with_attachment(AttachmentRef::new("/tmp/notes.txt"))
            .with_attachment(AttachmentRef::new(""))
            .with_attachment(AttachmentRef::new("/tmp/a.pdf").with_name("Alpha"));

        let pdfs = pdf_attachments(&turn);
        let names: Vec<_> = pdfs.iter().map(AttachmentRef::display_name).collect();
        assert_eq!(names, ["b.PDF", "Alpha"]);
    }

    #[test]
    fn mime_type_alone_does_not_qualify() {
        let turn = ChatTurn::new("")
            .with_attachment(AttachmentRef::new("/tmp/upload.bin").with_mime("application/pdf"));
        assert!(pdf_attachments(&turn).is_empty());
    }
}
