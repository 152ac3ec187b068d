error_chain! {
    types {
        RouterError, RouterErrorKind, RouterResultExt, RouterResult;
    }

    errors {
        NoRoute {
        } {
            description("No Direct Neighbor Or Route Table Entry For Destination")
        }

        LinkGone {
        } {
            description("Link Selected By The Route Table Is No Longer Connected")
        }
    }
}
